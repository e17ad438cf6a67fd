//! Name-keyed table of trigger plugin factories.

use std::collections::HashMap;
use std::sync::Arc;

use tideline_trigger::{Trigger, TriggerError, TriggerParams};

use crate::builtin::{ScheduleTrigger, WebhookTrigger};

/// Constructs a plugin instance for one run.
pub type TriggerFactory =
  Arc<dyn Fn(TriggerParams) -> Result<Box<dyn Trigger>, TriggerError> + Send + Sync>;

/// Registry of trigger plugins, resolved by the name used in workflows.
#[derive(Clone, Default)]
pub struct TriggerRegistry {
  factories: HashMap<String, TriggerFactory>,
}

impl TriggerRegistry {
  /// An empty registry.
  pub fn new() -> Self {
    Self::default()
  }

  /// A registry holding the built-in `webhook` and `schedule` triggers.
  pub fn with_builtins() -> Self {
    let mut registry = Self::new();
    registry
      .register("webhook", |params| {
        Ok(Box::new(WebhookTrigger::new(params)) as Box<dyn Trigger>)
      })
      .register("schedule", |params| {
        Ok(Box::new(ScheduleTrigger::new(params)) as Box<dyn Trigger>)
      });
    registry
  }

  /// Register `factory` under `name`, replacing any previous entry.
  pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
  where
    F: Fn(TriggerParams) -> Result<Box<dyn Trigger>, TriggerError> + Send + Sync + 'static,
  {
    self.factories.insert(name.into(), Arc::new(factory));
    self
  }

  pub fn contains(&self, name: &str) -> bool {
    self.factories.contains_key(name)
  }

  /// Registered names, sorted.
  pub fn names(&self) -> Vec<&str> {
    let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
    names.sort_unstable();
    names
  }

  /// Instantiate the plugin registered under `name`.
  pub fn create(&self, name: &str, params: TriggerParams) -> Result<Box<dyn Trigger>, TriggerError> {
    let factory = self
      .factories
      .get(name)
      .ok_or_else(|| TriggerError::NotFound(name.to_string()))?;
    factory(params)
  }
}

impl std::fmt::Debug for TriggerRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("TriggerRegistry")
      .field("triggers", &self.names())
      .finish()
  }
}
