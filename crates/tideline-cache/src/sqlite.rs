use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::error::CacheError;
use crate::kv::KvStore;

/// SQLite-based KV store.
///
/// Values are stored as JSON text in a single `trigger_cache` table.
pub struct SqliteKvStore {
  pool: SqlitePool,
}

impl SqliteKvStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Open (creating if needed) a database file and run migrations.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
    let options = SqliteConnectOptions::new()
      .filename(path.as_ref())
      .create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;

    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), CacheError> {
    sqlx::migrate!("../../migrations").run(&self.pool).await?;
    Ok(())
  }

  fn encode(key: &str, value: &serde_json::Value) -> Result<String, CacheError> {
    serde_json::to_string(value).map_err(|source| CacheError::Serialization {
      key: key.to_string(),
      source,
    })
  }
}

const UPSERT: &str = r#"
  INSERT INTO trigger_cache (key, value, updated_at)
  VALUES (?, ?, ?)
  ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
"#;

#[async_trait]
impl KvStore for SqliteKvStore {
  async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError> {
    let raw: Option<String> = sqlx::query_scalar("SELECT value FROM trigger_cache WHERE key = ?")
      .bind(key)
      .fetch_optional(&self.pool)
      .await?;

    raw
      .map(|text| {
        serde_json::from_str(&text).map_err(|source| CacheError::Serialization {
          key: key.to_string(),
          source,
        })
      })
      .transpose()
  }

  async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), CacheError> {
    let encoded = Self::encode(key, &value)?;
    sqlx::query(UPSERT)
      .bind(key)
      .bind(encoded)
      .bind(Utc::now())
      .execute(&self.pool)
      .await?;

    Ok(())
  }

  async fn delete(&self, key: &str) -> Result<(), CacheError> {
    sqlx::query("DELETE FROM trigger_cache WHERE key = ?")
      .bind(key)
      .execute(&self.pool)
      .await?;

    Ok(())
  }

  async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
    let keys: Vec<String> = sqlx::query_scalar(
      r#"
      SELECT key FROM trigger_cache
      WHERE substr(key, 1, ?) = ?
      ORDER BY key ASC
      "#,
    )
    .bind(prefix.chars().count() as i64)
    .bind(prefix)
    .fetch_all(&self.pool)
    .await?;

    Ok(keys)
  }

  async fn set_many(&self, entries: Vec<(String, serde_json::Value)>) -> Result<(), CacheError> {
    let now = Utc::now();
    let mut tx = self.pool.begin().await?;

    for (key, value) in &entries {
      let encoded = Self::encode(key, value)?;
      sqlx::query(UPSERT)
        .bind(key)
        .bind(encoded)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
  }

  async fn delete_prefix(&self, prefix: &str) -> Result<(), CacheError> {
    sqlx::query("DELETE FROM trigger_cache WHERE substr(key, 1, ?) = ?")
      .bind(prefix.chars().count() as i64)
      .bind(prefix)
      .execute(&self.pool)
      .await?;

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  async fn open_temp() -> (SqliteKvStore, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let store = SqliteKvStore::open(dir.path().join("cache.db"))
      .await
      .expect("failed to open store");
    (store, dir)
  }

  #[tokio::test]
  async fn test_sqlite_get_set_delete() {
    let (store, _dir) = open_temp().await;

    assert_eq!(store.get("key").await.unwrap(), None);

    store.set("key", json!({"a": [1, 2]})).await.unwrap();
    assert_eq!(store.get("key").await.unwrap(), Some(json!({"a": [1, 2]})));

    store.set("key", json!(42)).await.unwrap();
    assert_eq!(store.get("key").await.unwrap(), Some(json!(42)));

    store.delete("key").await.unwrap();
    assert_eq!(store.get("key").await.unwrap(), None);
  }

  #[tokio::test]
  async fn test_sqlite_prefix_and_batch() {
    let (store, _dir) = open_temp().await;

    store
      .set_many(vec![
        ("trigger:a:firstRunAt".to_string(), json!(1)),
        ("trigger:a:deduplicationKeys".to_string(), json!(["x"])),
        ("trigger:b:firstRunAt".to_string(), json!(2)),
      ])
      .await
      .unwrap();

    let keys = store.keys_with_prefix("trigger:a:").await.unwrap();
    assert_eq!(keys.len(), 2);

    store.delete_prefix("trigger:a:").await.unwrap();
    assert!(store.keys_with_prefix("trigger:a:").await.unwrap().is_empty());
    assert_eq!(store.get("trigger:b:firstRunAt").await.unwrap(), Some(json!(2)));
  }

  #[tokio::test]
  async fn test_sqlite_state_survives_reopen() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = dir.path().join("cache.db");

    {
      let store = SqliteKvStore::open(&path).await.unwrap();
      store.set("firstRunAt", json!(1704067200000_i64)).await.unwrap();
    }

    let reopened = SqliteKvStore::open(&path).await.unwrap();
    assert_eq!(
      reopened.get("firstRunAt").await.unwrap(),
      Some(json!(1704067200000_i64))
    );
  }
}
