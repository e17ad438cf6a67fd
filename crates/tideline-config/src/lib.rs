//! Tideline Config
//!
//! This crate contains the serializable configuration types for tideline
//! triggers. A workflow declares one or more triggers under `on`, each with
//! its own [`TriggerOptions`]. The engine takes these options, validates them,
//! and uses them to resolve the trigger's identity, routing and scripts.
//!
//! Option keys are accepted in camelCase (`skipFirst`, `deduplicationKey`,
//! `filterScript`, ...) to match the workflow files users already write.

mod error;
mod options;
mod workflow;

pub use error::ConfigError;
pub use options::{DEFAULT_WEBHOOK_PATH, TriggerConfig, TriggerOptions};
pub use workflow::{WorkflowDef, WorkflowRef};
