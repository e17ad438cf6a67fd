/// Error type for trigger operations.
#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
  #[error("trigger not found: {0}")]
  NotFound(String),

  #[error("invalid trigger configuration: {0}")]
  InvalidConfig(String),

  /// The external source could not be reached or returned garbage.
  #[error("fetch failed: {message}")]
  Fetch {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
  },

  /// The plugin returned data that is not item-shaped.
  #[error("contract violation: {0}")]
  ContractViolation(String),
}

impl TriggerError {
  /// Create a fetch error without an underlying cause.
  pub fn fetch(message: impl Into<String>) -> Self {
    Self::Fetch {
      message: message.into(),
      source: None,
    }
  }

  /// Create a fetch error wrapping the transport's error.
  pub fn fetch_with(
    message: impl Into<String>,
    source: impl std::error::Error + Send + Sync + 'static,
  ) -> Self {
    Self::Fetch {
      message: message.into(),
      source: Some(Box::new(source)),
    }
  }
}
