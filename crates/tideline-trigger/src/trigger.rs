use async_trait::async_trait;
use serde_json::Value;
use tideline_cache::TriggerCache;
use tideline_config::TriggerOptions;

use crate::context::TriggerContext;
use crate::error::TriggerError;
use crate::event::TriggerEvent;

/// How a trigger obtains its raw data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
  /// Fetches from an external source on schedule events.
  Pull,
  /// Derives items from webhook requests routed to it.
  Push,
}

/// Deduplication hints a trigger declares about its items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupHints {
  /// When false, every item is emitted and no fingerprints are recorded.
  pub should_deduplicate: bool,

  /// Fingerprint items by this field alone instead of their whole content.
  ///
  /// Use when the field is already a stable unique key (e.g. a feed `guid`):
  /// an edited entry with the same key is then never re-emitted.
  pub key_field: Option<String>,
}

impl Default for DedupHints {
  fn default() -> Self {
    Self {
      should_deduplicate: true,
      key_field: None,
    }
  }
}

impl DedupHints {
  /// Hints for triggers whose items are unique by `field`.
  pub fn unique_by(field: impl Into<String>) -> Self {
    Self {
      should_deduplicate: true,
      key_field: Some(field.into()),
    }
  }

  /// Hints for triggers whose every item must be emitted.
  pub fn disabled() -> Self {
    Self {
      should_deduplicate: false,
      key_field: None,
    }
  }
}

/// Everything a trigger plugin is constructed with.
#[derive(Debug, Clone)]
pub struct TriggerParams {
  /// Identity and first-run state of this trigger.
  pub context: TriggerContext,
  /// Options declared in the workflow.
  pub options: TriggerOptions,
  /// The trigger's own cache namespace. The only state a plugin may touch.
  pub cache: TriggerCache,
}

/// Raw output of one trigger invocation.
///
/// Items are kept as raw JSON here; the engine validates them into
/// [`Item`](crate::Item)s and reports anything that is not item-shaped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriggerOutput {
  pub items: Vec<Value>,
}

impl TriggerOutput {
  pub fn new(items: Vec<Value>) -> Self {
    Self { items }
  }

  /// Accept either a bare array of items or an object with an `items` array.
  pub fn from_value(value: Value) -> Result<Self, TriggerError> {
    match value {
      Value::Array(items) => Ok(Self { items }),
      Value::Object(mut map) => match map.remove("items") {
        Some(Value::Array(items)) => Ok(Self { items }),
        Some(_) => Err(TriggerError::ContractViolation(
          "'items' must be an array".to_string(),
        )),
        None => Err(TriggerError::ContractViolation(
          "output object has no 'items' array".to_string(),
        )),
      },
      _ => Err(TriggerError::ContractViolation(
        "output must be an array of items or an object with 'items'".to_string(),
      )),
    }
  }
}

impl From<Vec<Value>> for TriggerOutput {
  fn from(items: Vec<Value>) -> Self {
    Self { items }
  }
}

/// The capability every trigger plugin implements.
///
/// Plugins produce raw items in their natural order; they do not
/// deduplicate, filter or sort. They must not touch shared state other than
/// the [`TriggerCache`] handed to them in [`TriggerParams`].
#[async_trait]
pub trait Trigger: Send + Sync {
  /// Whether this trigger pulls on schedule events or is pushed webhooks.
  fn kind(&self) -> TriggerKind;

  /// Deduplication hints for this trigger's items.
  fn dedup_hints(&self) -> DedupHints {
    DedupHints::default()
  }

  /// Produce the raw items for this invocation.
  ///
  /// Webhook events arrive already routed: the request path is relative to
  /// the trigger's root.
  async fn run(&self, event: &TriggerEvent) -> Result<TriggerOutput, TriggerError>;
}
