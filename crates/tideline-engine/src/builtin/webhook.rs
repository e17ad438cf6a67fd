use async_trait::async_trait;
use tideline_config::TriggerOptions;
use tideline_trigger::{
  Trigger, TriggerError, TriggerEvent, TriggerKind, TriggerOutput, TriggerParams,
};

use crate::webhook::request_item;

/// Push trigger yielding one item per routed webhook request.
#[derive(Debug, Clone)]
pub struct WebhookTrigger {
  options: TriggerOptions,
}

impl WebhookTrigger {
  pub fn new(params: TriggerParams) -> Self {
    Self {
      options: params.options,
    }
  }
}

#[async_trait]
impl Trigger for WebhookTrigger {
  fn kind(&self) -> TriggerKind {
    TriggerKind::Push
  }

  async fn run(&self, event: &TriggerEvent) -> Result<TriggerOutput, TriggerError> {
    match event {
      TriggerEvent::Webhook { request } => Ok(vec![request_item(request, &self.options)].into()),
      TriggerEvent::Schedule => Ok(TriggerOutput::default()),
    }
  }
}
