use std::collections::BTreeMap;
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::options::TriggerOptions;

/// A workflow definition: the triggers it declares, keyed by trigger name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDef {
  #[serde(default)]
  pub on: BTreeMap<String, TriggerOptions>,
}

impl WorkflowDef {
  /// Parse a workflow from its JSON form.
  pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
    Ok(serde_json::from_str(content)?)
  }

  /// Options for a declared trigger.
  pub fn trigger(&self, name: &str) -> Result<&TriggerOptions, ConfigError> {
    self
      .on
      .get(name)
      .ok_or_else(|| ConfigError::TriggerNotDeclared(name.to_string()))
  }
}

/// Identity of a workflow file: its path relative to the workflows root.
///
/// Always stored with forward slashes so the same file yields the same
/// identity on every platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkflowRef {
  relative_path: String,
}

impl WorkflowRef {
  /// Validate and normalize a workflow's relative path.
  pub fn new(relative_path: impl AsRef<str>) -> Result<Self, ConfigError> {
    let raw = relative_path.as_ref();
    let invalid = |message: &str| ConfigError::InvalidWorkflowPath {
      path: raw.to_string(),
      message: message.to_string(),
    };

    let normalized = raw.replace('\\', "/");
    if normalized.trim().is_empty() {
      return Err(invalid("path is empty"));
    }
    if normalized.starts_with('/') {
      return Err(invalid("path must be relative to the workflows root"));
    }

    let mut segments = Vec::new();
    for component in Path::new(&normalized).components() {
      match component {
        Component::Normal(segment) => segments.push(segment.to_string_lossy().into_owned()),
        Component::CurDir => {}
        _ => return Err(invalid("path must not leave the workflows root")),
      }
    }
    if segments.is_empty() {
      return Err(invalid("path has no file name"));
    }

    Ok(Self {
      relative_path: segments.join("/"),
    })
  }

  /// Path relative to the workflows root, e.g. `feeds/rss.yml`.
  pub fn relative_path(&self) -> &str {
    &self.relative_path
  }

  /// Relative path without its file extension, e.g. `feeds/rss`.
  pub fn stem(&self) -> &str {
    let file_start = self.relative_path.rfind('/').map(|i| i + 1).unwrap_or(0);
    match self.relative_path[file_start..].rfind('.') {
      Some(dot) if dot > 0 => &self.relative_path[..file_start + dot],
      _ => &self.relative_path,
    }
  }
}

impl TryFrom<String> for WorkflowRef {
  type Error = ConfigError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    Self::new(value)
  }
}

impl From<WorkflowRef> for String {
  fn from(value: WorkflowRef) -> Self {
    value.relative_path
  }
}

impl std::fmt::Display for WorkflowRef {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.relative_path)
  }
}
