//! Trigger capability contract for tideline.
//!
//! Triggers turn external events into items. They come in two kinds:
//! - Pull: fetch from an external source on every schedule tick (feeds, APIs)
//! - Push: derive items from an inbound webhook request
//!
//! Every plugin implements [`Trigger`]. The engine owns everything around
//! it: identity, deduplication, scripts and cache persistence. A plugin only
//! sees its [`TriggerParams`] and the event it is asked to handle.

mod context;
mod digest;
mod error;
mod event;
mod item;
mod trigger;

pub use context::TriggerContext;
pub use digest::{canonical_json, content_digest};
pub use error::TriggerError;
pub use event::{TriggerEvent, WebhookRequest};
pub use item::Item;
pub use trigger::{DedupHints, Trigger, TriggerKind, TriggerOutput, TriggerParams};
