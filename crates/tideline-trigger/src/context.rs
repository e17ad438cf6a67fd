use serde::{Deserialize, Serialize};

/// Identity and run-state of one trigger, captured at the start of a run.
///
/// The value is immutable for the duration of the run: `is_first_run`
/// reflects what the cache held before the run started, even after the run
/// records its own `firstRunAt`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerContext {
  /// Stable identity string scoping all cache state of this trigger.
  pub identity: String,

  /// Path of the workflow file relative to the workflows root.
  pub workflow_relative_path: String,

  /// Name of the trigger within the workflow.
  pub trigger_name: String,

  /// No run has been recorded for this identity yet.
  pub is_first_run: bool,

  /// When the first successful run was recorded (Unix millis).
  #[serde(skip_serializing_if = "Option::is_none")]
  pub first_run_at: Option<i64>,
}
