use crate::sandbox::ScriptKind;

/// Errors raised while compiling or evaluating a user script.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScriptError {
  /// The script body is not valid Lua.
  #[error("{kind} failed to compile: {message}")]
  Compile { kind: ScriptKind, message: String },

  /// The script raised an error while running.
  #[error("{kind} raised an error: {message}")]
  Runtime { kind: ScriptKind, message: String },

  /// The script returned a value of the wrong type.
  #[error("{kind} returned {found}, expected {expected}")]
  InvalidReturn {
    kind: ScriptKind,
    expected: &'static str,
    found: String,
  },

  /// The script ran out of instructions or memory.
  #[error("{kind} exceeded its budget: {message}")]
  Budget { kind: ScriptKind, message: String },

  /// The Lua state itself could not be prepared.
  #[error("failed to prepare script sandbox: {message}")]
  Sandbox { message: String },
}

impl ScriptError {
  /// The script kind involved, when the error comes from a script.
  pub fn kind(&self) -> Option<ScriptKind> {
    match self {
      Self::Compile { kind, .. }
      | Self::Runtime { kind, .. }
      | Self::InvalidReturn { kind, .. }
      | Self::Budget { kind, .. } => Some(*kind),
      Self::Sandbox { .. } => None,
    }
  }

  pub(crate) fn sandbox(error: mlua::Error) -> Self {
    Self::Sandbox {
      message: error.to_string(),
    }
  }
}
