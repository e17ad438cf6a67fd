/// Errors raised while validating workflow or trigger configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  /// The workflow reference is not a usable relative path.
  #[error("invalid workflow path '{path}': {message}")]
  InvalidWorkflowPath { path: String, message: String },

  /// A trigger option has an unusable value.
  #[error("invalid option '{option}': {message}")]
  InvalidOption { option: String, message: String },

  /// The workflow does not declare the requested trigger.
  #[error("trigger '{0}' is not declared in the workflow")]
  TriggerNotDeclared(String),

  /// The workflow document could not be parsed.
  #[error("failed to parse workflow: {0}")]
  Parse(#[from] serde_json::Error),
}

impl ConfigError {
  pub fn invalid_option(option: impl Into<String>, message: impl Into<String>) -> Self {
    Self::InvalidOption {
      option: option.into(),
      message: message.into(),
    }
  }
}
