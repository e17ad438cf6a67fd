use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tideline_trigger::{
  DedupHints, Trigger, TriggerError, TriggerEvent, TriggerKind, TriggerOutput, TriggerParams,
};

/// Pull trigger yielding one tick item per schedule event.
///
/// Every tick is new, so deduplication is disabled.
#[derive(Debug, Clone, Default)]
pub struct ScheduleTrigger;

impl ScheduleTrigger {
  pub fn new(_params: TriggerParams) -> Self {
    Self
  }
}

#[async_trait]
impl Trigger for ScheduleTrigger {
  fn kind(&self) -> TriggerKind {
    TriggerKind::Pull
  }

  fn dedup_hints(&self) -> DedupHints {
    DedupHints::disabled()
  }

  async fn run(&self, event: &TriggerEvent) -> Result<TriggerOutput, TriggerError> {
    match event {
      TriggerEvent::Schedule => {
        let now = Utc::now();
        Ok(vec![json!({ "id": now.timestamp_millis(), "date": now.to_rfc3339() })].into())
      }
      TriggerEvent::Webhook { .. } => Ok(TriggerOutput::default()),
    }
  }
}
