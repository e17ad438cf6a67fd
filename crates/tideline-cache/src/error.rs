use thiserror::Error;

/// Errors that can occur while reading or writing trigger state.
#[derive(Debug, Error)]
pub enum CacheError {
  /// The backing database failed.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  /// Schema migration failed.
  #[error("migration failed: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),

  /// A value could not be encoded or decoded.
  #[error("failed to serialize cache value for '{key}': {source}")]
  Serialization {
    key: String,
    #[source]
    source: serde_json::Error,
  },

  /// A stored value does not have the shape the engine wrote.
  #[error("corrupt cache entry '{key}': {message}")]
  Corrupt { key: String, message: String },

  /// An in-process lock was poisoned by a panicking writer.
  #[error("cache lock poisoned: {message}")]
  Lock { message: String },
}

impl CacheError {
  /// Create a corruption error for a stored key.
  pub fn corrupt(key: impl Into<String>, message: impl Into<String>) -> Self {
    Self::Corrupt {
      key: key.into(),
      message: message.into(),
    }
  }

  pub(crate) fn lock(message: impl std::fmt::Display) -> Self {
    Self::Lock {
      message: message.to_string(),
    }
  }
}
