//! Tideline Cache
//!
//! Persistent key-value state for triggers. The engine never talks to a
//! storage medium directly: it receives a [`KvStore`] and wraps it in a
//! [`TriggerCache`], a facade scoped to one trigger identity's namespace.
//!
//! Two stores are provided:
//! - [`InMemoryKvStore`] for tests and single-process use
//! - [`SqliteKvStore`] for state that must survive cold starts
//!
//! Stores do not lock across processes. Two invocations of the same trigger
//! identity running at once resolve by last write wins.

mod error;
mod kv;
mod scoped;
mod sqlite;

pub use error::CacheError;
pub use kv::{InMemoryKvStore, KvStore};
pub use scoped::TriggerCache;
pub use sqlite::SqliteKvStore;
