use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Webhook sub-path answered by a trigger that declares no `path`.
pub const DEFAULT_WEBHOOK_PATH: &str = "/";

const HTTP_METHODS: &[&str] = &["get", "post", "put", "patch", "delete", "head", "options"];

/// Options declared for one trigger in a workflow.
///
/// Well-known keys are typed. Anything else (`url`, feed credentials, ...)
/// lands in `extra` and is left for the trigger plugin to interpret.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerOptions {
  /// Webhook sub-path this trigger answers, e.g. `/test`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub path: Option<String>,

  /// HTTP method restriction for webhook requests. Any method when unset.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub method: Option<String>,

  /// Body field used as the webhook item's deduplication key, e.g. `update_id`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub deduplication_key: Option<String>,

  /// Engine-level behavior shared by every trigger kind.
  #[serde(default)]
  pub config: TriggerConfig,

  /// Plugin-specific options.
  #[serde(flatten)]
  pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TriggerOptions {
  /// Look up a plugin-specific option.
  pub fn option(&self, key: &str) -> Option<&serde_json::Value> {
    self.extra.get(key)
  }

  /// Look up a plugin-specific string option.
  pub fn option_str(&self, key: &str) -> Option<&str> {
    self.extra.get(key).and_then(|v| v.as_str())
  }

  /// Validate option values. Runs before any cache access.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if let Some(method) = &self.method
      && !HTTP_METHODS.contains(&method.to_ascii_lowercase().as_str())
    {
      return Err(ConfigError::invalid_option(
        "method",
        format!("unsupported HTTP method '{}'", method),
      ));
    }

    if let Some(path) = &self.path
      && (path.contains('?') || path.contains('#'))
    {
      return Err(ConfigError::invalid_option(
        "path",
        format!("'{}' must not contain a query or fragment", path),
      ));
    }

    if let Some(key) = &self.deduplication_key
      && key.trim().is_empty()
    {
      return Err(ConfigError::invalid_option(
        "deduplicationKey",
        "must not be empty",
      ));
    }

    self.config.validate()
  }
}

/// Engine behavior for a trigger: deduplication policy, scripts, limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerConfig {
  /// Bypass deduplication and emit every raw item.
  #[serde(default)]
  pub force: bool,

  /// On the first run, record a baseline but emit nothing.
  #[serde(default)]
  pub skip_first: bool,

  /// Lua body deciding whether an item is kept. Binds `item` and `context`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub filter_script: Option<String>,

  /// Lua comparator body ordering emitted items. Binds `a` and `b`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sort_script: Option<String>,

  /// Lua body returning a replacement for each item. Binds `item` and `context`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub format_script: Option<String>,

  /// Maximum number of items emitted by one run.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub limit: Option<usize>,

  /// Inactive triggers are skipped without touching the cache.
  #[serde(default = "default_active")]
  pub active: bool,

  /// Partitions the cache so two instances of a trigger keep separate history.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cache_key: Option<String>,

  /// Overrides the engine's cap on remembered fingerprints.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub max_cached_items: Option<usize>,

  /// Overrides the engine's fetch timeout.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,
}

fn default_active() -> bool {
  true
}

impl Default for TriggerConfig {
  fn default() -> Self {
    Self {
      force: false,
      skip_first: false,
      filter_script: None,
      sort_script: None,
      format_script: None,
      limit: None,
      active: true,
      cache_key: None,
      max_cached_items: None,
      timeout_ms: None,
    }
  }
}

impl TriggerConfig {
  fn validate(&self) -> Result<(), ConfigError> {
    let scripts = [
      ("filterScript", &self.filter_script),
      ("sortScript", &self.sort_script),
      ("formatScript", &self.format_script),
    ];
    for (option, script) in scripts {
      if let Some(body) = script
        && body.trim().is_empty()
      {
        return Err(ConfigError::invalid_option(option, "script body is empty"));
      }
    }

    if let Some(key) = &self.cache_key
      && key.trim().is_empty()
    {
      return Err(ConfigError::invalid_option("cacheKey", "must not be empty"));
    }

    if self.max_cached_items == Some(0) {
      return Err(ConfigError::invalid_option(
        "maxCachedItems",
        "must be greater than zero",
      ));
    }

    if self.timeout_ms == Some(0) {
      return Err(ConfigError::invalid_option(
        "timeoutMs",
        "must be greater than zero",
      ));
    }

    Ok(())
  }
}
