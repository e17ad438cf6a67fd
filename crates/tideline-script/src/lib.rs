//! Sandboxed evaluation of user scripts.
//!
//! Workflow authors attach small Lua bodies to a trigger:
//! - `filterScript` decides whether an item is kept (`item`, `context`)
//! - `formatScript` returns a replacement item (`item`, `context`)
//! - `sortScript` compares two items like a comparator (`a`, `b`)
//!
//! A body that parses as a single expression is evaluated as one, so both
//! `b.id - a.id` and `return b.id - a.id` are accepted.
//!
//! Each evaluation gets a fresh environment holding only its bindings and
//! a safe subset of the standard library: no `io`, `os`, `require`, `load`,
//! `debug` or `pcall`. Bindings are copies, so a script cannot reach engine
//! state. An instruction budget and a memory limit stop runaway scripts.
//!
//! Truthiness is Lua's: only `nil` and `false` drop an item. Filters written
//! as JavaScript expressions need porting, since `0` and `""` are truthy here
//! and `===` becomes `==`.

mod error;
mod sandbox;
mod sort;

pub use error::ScriptError;
pub use sandbox::{ScriptBudget, ScriptKind, ScriptSandbox, ScriptSession};
pub use sort::stable_sort_by;
