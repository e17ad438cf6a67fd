use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::CacheError;

/// Trait for the key-value medium that backs trigger state.
///
/// Keys are flat strings; scoping by trigger identity is done by
/// [`TriggerCache`](crate::TriggerCache) through key prefixes. Values are JSON.
///
/// This trait is async to support networked backends.
#[async_trait]
pub trait KvStore: Send + Sync {
  /// Get a value by key.
  async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError>;

  /// Set a value, replacing any previous one.
  async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), CacheError>;

  /// Delete a value. Deleting a missing key is not an error.
  async fn delete(&self, key: &str) -> Result<(), CacheError>;

  /// List every key starting with `prefix`.
  async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError>;

  /// Set several values as one unit.
  ///
  /// The default writes them one by one. Stores that can do better (a
  /// database transaction) should override this so that a failure leaves
  /// either all or none of the entries written.
  async fn set_many(&self, entries: Vec<(String, serde_json::Value)>) -> Result<(), CacheError> {
    for (key, value) in entries {
      self.set(&key, value).await?;
    }
    Ok(())
  }

  /// Delete every key starting with `prefix`.
  async fn delete_prefix(&self, prefix: &str) -> Result<(), CacheError> {
    for key in self.keys_with_prefix(prefix).await? {
      self.delete(&key).await?;
    }
    Ok(())
  }
}

/// In-memory KV store implementation.
///
/// Clones share the same underlying map, so one store can be handed to
/// several engines in a test and observed from outside.
#[derive(Debug, Clone, Default)]
pub struct InMemoryKvStore {
  data: Arc<RwLock<BTreeMap<String, serde_json::Value>>>,
}

impl InMemoryKvStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of stored entries across all namespaces.
  pub fn len(&self) -> usize {
    self.data.read().map(|data| data.len()).unwrap_or(0)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
  async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError> {
    let data = self.data.read().map_err(CacheError::lock)?;
    Ok(data.get(key).cloned())
  }

  async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), CacheError> {
    let mut data = self.data.write().map_err(CacheError::lock)?;
    data.insert(key.to_string(), value);
    Ok(())
  }

  async fn delete(&self, key: &str) -> Result<(), CacheError> {
    let mut data = self.data.write().map_err(CacheError::lock)?;
    data.remove(key);
    Ok(())
  }

  async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
    let data = self.data.read().map_err(CacheError::lock)?;
    Ok(
      data
        .range(prefix.to_string()..)
        .take_while(|(key, _)| key.starts_with(prefix))
        .map(|(key, _)| key.clone())
        .collect(),
    )
  }

  async fn set_many(&self, entries: Vec<(String, serde_json::Value)>) -> Result<(), CacheError> {
    // Single write lock: readers never observe half of the batch.
    let mut data = self.data.write().map_err(CacheError::lock)?;
    data.extend(entries);
    Ok(())
  }

  async fn delete_prefix(&self, prefix: &str) -> Result<(), CacheError> {
    let mut data = self.data.write().map_err(CacheError::lock)?;
    data.retain(|key, _| !key.starts_with(prefix));
    Ok(())
  }
}
