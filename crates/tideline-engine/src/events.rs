//! Run events and notifiers for observability.
//!
//! Events are emitted while a trigger runs so that a scheduler can record
//! outcomes, export counters, or stream progress somewhere else.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted during a trigger run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RunEvent {
  /// A run has started.
  RunStarted {
    identity: String,
    trigger: String,
    event: String,
  },

  /// The plugin returned its raw items.
  ItemsFetched { identity: String, count: usize },

  /// A webhook request did not match this trigger.
  WebhookIgnored { identity: String, path: String },

  /// Deduplication finished.
  ItemsReconciled {
    identity: String,
    fresh: usize,
    duplicates: usize,
  },

  /// A user script failed for one item or comparison.
  ScriptFailed {
    identity: String,
    script: String,
    error: String,
  },

  /// A run has committed its cache state and returned items.
  RunCompleted { identity: String, emitted: usize },

  /// A run has failed. Its cache state is unchanged.
  RunFailed { identity: String, error: String },
}

/// Trait for receiving run events.
///
/// The engine calls `notify` for each event; implementations decide what to
/// do with them.
pub trait RunNotifier: Send + Sync {
  fn notify(&self, event: RunEvent);
}

/// A notifier that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl RunNotifier for NoopNotifier {
  fn notify(&self, _event: RunEvent) {}
}

/// A notifier that sends events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // Unbounded so a slow consumer never stalls a run. Volume is a handful of
  // events per run.
  sender: mpsc::UnboundedSender<RunEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<RunEvent>) -> Self {
    Self { sender }
  }
}

impl RunNotifier for ChannelNotifier {
  fn notify(&self, event: RunEvent) {
    // Receiver may have been dropped
    let _ = self.sender.send(event);
  }
}
