//! Tideline trigger execution engine.
//!
//! Turns schedule ticks and inbound webhooks into deduplicated items.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       TriggerEngine                          │
//! │  - run(RunRequest) → RunResult { items, helpers }            │
//! │  - owns the registry, sandbox, config and notifier           │
//! └──────────────────────────────────────────────────────────────┘
//!        │               │                 │               │
//!        ▼               ▼                 ▼               ▼
//!  ContextResolver  WebhookRouter      Reconciler      pipeline
//!  identity +       prefix, path,      fingerprints,   filter, format,
//!  firstRunAt       method matching    seen set        sort, limit
//!        │                                 │
//!        └────────────► TriggerCache ◄─────┘
//!                  (namespaced KvStore view)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use tideline_engine::{EngineConfig, RunRequest, TriggerEngine, TriggerRegistry, TriggerSpec};
//!
//! let store = Arc::new(SqliteKvStore::open("cache.db").await?);
//! let engine = TriggerEngine::new(store, TriggerRegistry::with_builtins(), EngineConfig::default());
//!
//! let result = engine
//!   .run(RunRequest {
//!     trigger: TriggerSpec::new("webhook", options),
//!     workflow: WorkflowRef::new("webhook.yml")?,
//!     event,
//!   })
//!   .await?;
//! ```

pub mod builtin;
mod config;
mod context;
mod dedup;
mod engine;
mod error;
mod events;
mod pipeline;
mod registry;
mod webhook;

pub use config::{EngineConfig, ScriptFailurePolicy};
pub use context::{ContextResolver, FIRST_RUN_AT_KEY, TriggerIdentity};
pub use dedup::{DedupPolicy, Reconciler, Reconciliation, SEEN_KEY, SeenSet, fingerprint};
pub use engine::{RunHelpers, RunRequest, RunResult, TriggerEngine, TriggerSpec};
pub use error::EngineError;
pub use events::{ChannelNotifier, NoopNotifier, RunEvent, RunNotifier};
pub use pipeline::{PipelineOutput, ScriptFailure};
pub use registry::{TriggerFactory, TriggerRegistry};
pub use webhook::{WebhookRouter, normalize_path, request_item};
