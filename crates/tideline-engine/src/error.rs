use tideline_cache::CacheError;
use tideline_config::ConfigError;
use tideline_script::ScriptError;
use tideline_trigger::TriggerError;

/// Errors that fail a trigger run.
///
/// A failed run never writes to the trigger's cache: everything up to the
/// final commit is computed in memory.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
  /// Malformed options or workflow reference. Raised before any cache access.
  #[error("configuration error: {0}")]
  Config(#[from] ConfigError),

  /// No plugin is registered under the trigger's name.
  #[error("unknown trigger '{trigger}'")]
  UnknownTrigger { trigger: String },

  /// The plugin failed to construct, fetch, or returned non-item data.
  #[error("trigger '{trigger}' failed: {source}")]
  Trigger {
    trigger: String,
    #[source]
    source: TriggerError,
  },

  /// Reading or writing trigger state failed.
  #[error("cache error: {0}")]
  Cache(#[from] CacheError),

  /// A script failed to compile, or failed at runtime under the abort policy.
  #[error("script error: {0}")]
  Script(#[from] ScriptError),

  /// The plugin fetch did not finish in time.
  #[error("trigger '{trigger}' timed out after {timeout_ms}ms")]
  Timeout { trigger: String, timeout_ms: u64 },

  /// The run was cancelled while fetching.
  #[error("run cancelled")]
  Cancelled,
}

impl EngineError {
  pub fn trigger(trigger: impl Into<String>, source: TriggerError) -> Self {
    Self::Trigger {
      trigger: trigger.into(),
      source,
    }
  }
}
