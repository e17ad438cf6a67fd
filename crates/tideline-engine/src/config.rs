use std::time::Duration;

use tideline_script::ScriptBudget;

/// What the engine does when a user script fails for one item or pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScriptFailurePolicy {
  /// Log the failure and carry on: a failing filter or formatter drops the
  /// item, a failing comparison keeps the pair's original order.
  #[default]
  Skip,
  /// Fail the whole run. The cache is left untouched.
  Abort,
}

/// Configuration for the trigger engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
  /// Fingerprints retained per trigger identity. Oldest are evicted first.
  /// Triggers can override it with `config.maxCachedItems`.
  pub max_cached_items: usize,

  /// Upper bound on one plugin fetch. Triggers can override it with
  /// `config.timeoutMs`.
  pub fetch_timeout: Duration,

  pub script_failure: ScriptFailurePolicy,

  /// Limits applied to each script evaluation.
  pub script_budget: ScriptBudget,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      max_cached_items: 5000,
      fetch_timeout: Duration::from_secs(30),
      script_failure: ScriptFailurePolicy::Skip,
      script_budget: ScriptBudget::default(),
    }
  }
}
