//! Triggers that ship with the engine.

mod schedule;
mod webhook;

pub use schedule::ScheduleTrigger;
pub use webhook::WebhookTrigger;
