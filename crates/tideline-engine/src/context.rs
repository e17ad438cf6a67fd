//! Trigger identity and first-run state.

use std::sync::Arc;

use serde_json::{Value, json};
use tideline_cache::{CacheError, KvStore, TriggerCache};
use tideline_config::{ConfigError, TriggerOptions, WorkflowRef};
use tideline_trigger::{TriggerContext, content_digest};
use tracing::debug;

/// Cache key holding the Unix-millis timestamp of the first committed run.
pub const FIRST_RUN_AT_KEY: &str = "firstRunAt";

/// The tuple that scopes all cache state of one trigger.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TriggerIdentity {
  pub workflow_relative_path: String,
  pub trigger_name: String,
  /// `config.cacheKey`, when the workflow partitions this trigger's history.
  pub partition: Option<String>,
}

impl TriggerIdentity {
  pub fn new(
    workflow: &WorkflowRef,
    trigger_name: &str,
    options: &TriggerOptions,
  ) -> Result<Self, ConfigError> {
    if trigger_name.trim().is_empty() {
      return Err(ConfigError::invalid_option("name", "trigger name is empty"));
    }

    Ok(Self {
      workflow_relative_path: workflow.relative_path().to_string(),
      trigger_name: trigger_name.to_string(),
      partition: options.config.cache_key.clone(),
    })
  }

  /// Deterministic identity string.
  ///
  /// Only the tuple fields feed the digest, so unrelated option edits (a new
  /// filter script, a different limit) keep the trigger's history.
  pub fn id(&self) -> String {
    let signature: Value = json!({
      "workflowRelativePath": self.workflow_relative_path,
      "triggerName": self.trigger_name,
      "partition": self.partition,
    });
    content_digest(&signature)
  }

  /// Cache namespace every key of this trigger lives under.
  pub fn namespace(&self) -> String {
    format!("trigger:{}", self.id())
  }
}

/// Resolves a [`TriggerContext`] from the cache store.
#[derive(Clone)]
pub struct ContextResolver {
  store: Arc<dyn KvStore>,
}

impl ContextResolver {
  pub fn new(store: Arc<dyn KvStore>) -> Self {
    Self { store }
  }

  /// The cache handle scoped to `identity`.
  pub fn cache(&self, identity: &TriggerIdentity) -> TriggerCache {
    TriggerCache::new(self.store.clone(), identity.namespace())
  }

  /// Read the first-run state for `identity`.
  ///
  /// Nothing is written here: `firstRunAt` is persisted only when a run
  /// commits, so a run that fails part-way still counts as a first run.
  /// A read failure is returned rather than treated as a first run.
  pub async fn resolve(
    &self,
    identity: &TriggerIdentity,
  ) -> Result<(TriggerContext, TriggerCache), CacheError> {
    let cache = self.cache(identity);
    let first_run_at = read_first_run_at(&cache).await?;

    let context = TriggerContext {
      identity: identity.id(),
      workflow_relative_path: identity.workflow_relative_path.clone(),
      trigger_name: identity.trigger_name.clone(),
      is_first_run: first_run_at.is_none(),
      first_run_at,
    };
    debug!(
      identity = %context.identity,
      trigger = %context.trigger_name,
      is_first_run = context.is_first_run,
      "trigger_context_resolved"
    );

    Ok((context, cache))
  }
}

impl std::fmt::Debug for ContextResolver {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ContextResolver").finish_non_exhaustive()
  }
}

async fn read_first_run_at(cache: &TriggerCache) -> Result<Option<i64>, CacheError> {
  match cache.get(FIRST_RUN_AT_KEY).await? {
    None => Ok(None),
    Some(value) => match value.as_i64() {
      Some(millis) if millis > 0 => Ok(Some(millis)),
      _ => Err(CacheError::corrupt(
        FIRST_RUN_AT_KEY,
        format!("expected a positive timestamp, found {}", value),
      )),
    },
  }
}
