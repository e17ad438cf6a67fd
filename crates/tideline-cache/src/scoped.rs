use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::CacheError;
use crate::kv::KvStore;

/// A cache handle scoped to one trigger identity.
///
/// Every key is stored as `<namespace>:<key>` in the underlying store, so two
/// triggers (or two differently partitioned instances of one trigger) never
/// see each other's entries. Callers only ever use short key names.
#[derive(Clone)]
pub struct TriggerCache {
  store: Arc<dyn KvStore>,
  namespace: String,
}

impl TriggerCache {
  /// Create a handle for `namespace` on top of `store`.
  pub fn new(store: Arc<dyn KvStore>, namespace: impl Into<String>) -> Self {
    Self {
      store,
      namespace: namespace.into(),
    }
  }

  /// The namespace this handle writes under.
  pub fn namespace(&self) -> &str {
    &self.namespace
  }

  fn scoped(&self, key: &str) -> String {
    format!("{}:{}", self.namespace, key)
  }

  fn prefix(&self) -> String {
    format!("{}:", self.namespace)
  }

  /// Get a raw JSON value.
  pub async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError> {
    self.store.get(&self.scoped(key)).await
  }

  /// Get a value and decode it into `T`.
  ///
  /// A value that exists but does not decode is reported as corruption.
  pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
    match self.get(key).await? {
      Some(value) => serde_json::from_value(value)
        .map(Some)
        .map_err(|e| CacheError::corrupt(key, e.to_string())),
      None => Ok(None),
    }
  }

  /// Set a raw JSON value.
  pub async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), CacheError> {
    self.store.set(&self.scoped(key), value).await
  }

  /// Encode `value` and store it.
  pub async fn set_as<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CacheError> {
    let encoded = serde_json::to_value(value).map_err(|source| CacheError::Serialization {
      key: key.to_string(),
      source,
    })?;
    self.set(key, encoded).await
  }

  /// Write several entries as one unit (see [`KvStore::set_many`]).
  pub async fn set_many(
    &self,
    entries: impl IntoIterator<Item = (&str, serde_json::Value)>,
  ) -> Result<(), CacheError> {
    let scoped = entries
      .into_iter()
      .map(|(key, value)| (self.scoped(key), value))
      .collect();
    self.store.set_many(scoped).await
  }

  /// Delete one entry.
  pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
    self.store.delete(&self.scoped(key)).await
  }

  /// Clear every entry under this namespace.
  ///
  /// The next run of the trigger behaves as a fresh first run.
  pub async fn reset(&self) -> Result<(), CacheError> {
    debug!(namespace = %self.namespace, "trigger_cache_reset");
    self.store.delete_prefix(&self.prefix()).await
  }
}

impl std::fmt::Debug for TriggerCache {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("TriggerCache")
      .field("namespace", &self.namespace)
      .finish_non_exhaustive()
  }
}
