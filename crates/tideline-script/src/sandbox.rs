use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{self, AtomicU64};

use mlua::{
  HookTriggers, Lua, LuaOptions, LuaSerdeExt, SerializeOptions, StdLib, Table, Value as LuaValue,
  VmState,
};
use serde_json::Value;
use tracing::trace;

use crate::error::ScriptError;

/// Globals copied into every evaluation environment.
///
/// `pcall` and `xpcall` stay out: they would catch the budget error raised
/// by the instruction hook.
const SAFE_FUNCTIONS: &[&str] = &[
  "assert", "error", "ipairs", "next", "pairs", "rawequal", "rawlen", "select", "tonumber",
  "tostring", "type",
];

/// Libraries shallow-copied into every evaluation environment.
const SAFE_LIBRARIES: &[&str] = &["math", "string", "table"];

/// The hook fires every this many VM instructions.
const INSTRUCTION_STEP: u32 = 1_000;

/// Which trigger option a script came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptKind {
  Filter,
  Format,
  Sort,
}

impl ScriptKind {
  /// The option name the script is declared under.
  pub fn option_name(&self) -> &'static str {
    match self {
      Self::Filter => "filterScript",
      Self::Format => "formatScript",
      Self::Sort => "sortScript",
    }
  }
}

impl fmt::Display for ScriptKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.option_name())
  }
}

/// Resource limits applied to each evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptBudget {
  /// VM instructions one evaluation may execute.
  pub max_instructions: u64,
  /// Bytes the Lua state may allocate.
  pub memory_limit: usize,
}

impl Default for ScriptBudget {
  fn default() -> Self {
    Self {
      max_instructions: 1_000_000,
      memory_limit: 16 * 1024 * 1024,
    }
  }
}

/// Factory for script sessions under a fixed budget.
#[derive(Debug, Clone, Default)]
pub struct ScriptSandbox {
  budget: ScriptBudget,
}

impl ScriptSandbox {
  pub fn new(budget: ScriptBudget) -> Self {
    Self { budget }
  }

  pub fn budget(&self) -> ScriptBudget {
    self.budget
  }

  /// Compile `source` without running it.
  pub fn check(&self, kind: ScriptKind, source: &str) -> Result<(), ScriptError> {
    self.session(kind, source).map(|_| ())
  }

  /// Compile `source` into a session that can be evaluated many times.
  pub fn session(&self, kind: ScriptKind, source: &str) -> Result<ScriptSession, ScriptError> {
    let lua = Lua::new_with(
      StdLib::STRING | StdLib::TABLE | StdLib::MATH,
      LuaOptions::default(),
    )
    .map_err(ScriptError::sandbox)?;
    lua
      .set_memory_limit(self.budget.memory_limit)
      .map_err(ScriptError::sandbox)?;

    let executed = Arc::new(AtomicU64::new(0));
    let counter = executed.clone();
    let max_instructions = self.budget.max_instructions;
    lua.set_hook(
      HookTriggers::new().every_nth_instruction(INSTRUCTION_STEP),
      move |_lua, _debug| {
        let total = counter.fetch_add(INSTRUCTION_STEP as u64, atomic::Ordering::Relaxed)
          + INSTRUCTION_STEP as u64;
        if total > max_instructions {
          Err(mlua::Error::runtime("instruction budget exceeded"))
        } else {
          Ok(VmState::Continue)
        }
      },
    );

    let code = compile(&lua, kind, source)?;

    Ok(ScriptSession {
      lua,
      kind,
      code,
      executed,
      max_instructions,
    })
  }
}

/// Prefer the body as an expression; fall back to a statement block.
fn compile(lua: &Lua, kind: ScriptKind, source: &str) -> Result<String, ScriptError> {
  let expression = format!("return {}", source.trim());
  if lua
    .load(expression.as_str())
    .set_name(chunk_name(kind))
    .into_function()
    .is_ok()
  {
    return Ok(expression);
  }

  lua
    .load(source)
    .set_name(chunk_name(kind))
    .into_function()
    .map_err(|e| ScriptError::Compile {
      kind,
      message: e.to_string(),
    })?;
  Ok(source.to_string())
}

fn chunk_name(kind: ScriptKind) -> String {
  format!("={}", kind.option_name())
}

/// A compiled script bound to its own Lua state.
///
/// Sessions are not shared between runs. Every evaluation starts from a
/// fresh environment, so globals written by one call are invisible to the
/// next.
pub struct ScriptSession {
  lua: Lua,
  kind: ScriptKind,
  code: String,
  executed: Arc<AtomicU64>,
  max_instructions: u64,
}

impl fmt::Debug for ScriptSession {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ScriptSession")
      .field("kind", &self.kind)
      .field("max_instructions", &self.max_instructions)
      .finish_non_exhaustive()
  }
}

impl ScriptSession {
  pub fn kind(&self) -> ScriptKind {
    self.kind
  }

  /// Evaluate a filter: truthy keeps the item.
  pub fn filter(&self, item: &Value, context: &Value) -> Result<bool, ScriptError> {
    let result = self.evaluate(&[("item", item), ("context", context)])?;
    Ok(!matches!(result, LuaValue::Nil | LuaValue::Boolean(false)))
  }

  /// Evaluate a formatter: the returned table replaces the item.
  pub fn format(&self, item: &Value, context: &Value) -> Result<Value, ScriptError> {
    let result = self.evaluate(&[("item", item), ("context", context)])?;
    if !matches!(result, LuaValue::Table(_)) {
      return Err(self.invalid_return("a table", &result));
    }

    let formatted: Value = self
      .lua
      .from_value(result)
      .map_err(|e| ScriptError::InvalidReturn {
        kind: self.kind,
        expected: "a JSON-compatible table",
        found: e.to_string(),
      })?;
    if !formatted.is_object() {
      return Err(ScriptError::InvalidReturn {
        kind: self.kind,
        expected: "a table with named fields",
        found: "an array".to_string(),
      });
    }
    Ok(formatted)
  }

  /// Evaluate a comparator: negative sorts `a` first, positive sorts `b`
  /// first, zero keeps their order.
  pub fn compare(&self, a: &Value, b: &Value) -> Result<Ordering, ScriptError> {
    let result = self.evaluate(&[("a", a), ("b", b)])?;
    match result {
      LuaValue::Integer(n) => Ok(n.cmp(&0)),
      LuaValue::Number(n) => n
        .partial_cmp(&0.0)
        .ok_or_else(|| self.invalid_return("a number", &LuaValue::Number(n))),
      other => Err(self.invalid_return("a number", &other)),
    }
  }

  fn evaluate(&self, bindings: &[(&str, &Value)]) -> Result<LuaValue, ScriptError> {
    self.executed.store(0, atomic::Ordering::Relaxed);

    let env = self.environment().map_err(ScriptError::sandbox)?;
    for (name, value) in bindings {
      let value = self
        .lua
        .to_value_with(*value, serialize_options())
        .map_err(ScriptError::sandbox)?;
      env.set(*name, value).map_err(ScriptError::sandbox)?;
    }

    let result = self
      .lua
      .load(self.code.as_str())
      .set_name(chunk_name(self.kind))
      .set_environment(env)
      .call::<LuaValue>(())
      .map_err(|e| self.classify(e))
      .and_then(|value| {
        // A script that swallowed the hook error still spent the budget.
        if self.exhausted() {
          Err(self.budget_exceeded())
        } else {
          Ok(value)
        }
      });

    trace!(
      kind = %self.kind,
      instructions = self.executed.load(atomic::Ordering::Relaxed),
      "script_evaluated"
    );
    result
  }

  fn environment(&self) -> mlua::Result<Table> {
    let globals = self.lua.globals();
    let env = self.lua.create_table()?;

    for name in SAFE_FUNCTIONS {
      env.set(*name, globals.get::<LuaValue>(*name)?)?;
    }
    for name in SAFE_LIBRARIES {
      let library: Table = globals.get(*name)?;
      let copy = self.lua.create_table()?;
      for pair in library.pairs::<LuaValue, LuaValue>() {
        let (key, value) = pair?;
        copy.set(key, value)?;
      }
      env.set(*name, copy)?;
    }

    Ok(env)
  }

  fn exhausted(&self) -> bool {
    self.executed.load(atomic::Ordering::Relaxed) > self.max_instructions
  }

  fn budget_exceeded(&self) -> ScriptError {
    ScriptError::Budget {
      kind: self.kind,
      message: format!("more than {} instructions", self.max_instructions),
    }
  }

  fn classify(&self, error: mlua::Error) -> ScriptError {
    if self.exhausted() {
      return self.budget_exceeded();
    }
    match error {
      mlua::Error::MemoryError(message) => ScriptError::Budget {
        kind: self.kind,
        message,
      },
      other => ScriptError::Runtime {
        kind: self.kind,
        message: other.to_string(),
      },
    }
  }

  fn invalid_return(&self, expected: &'static str, found: &LuaValue) -> ScriptError {
    let found = match found {
      LuaValue::Number(n) if n.is_nan() => "NaN".to_string(),
      other => other.type_name().to_string(),
    };
    ScriptError::InvalidReturn {
      kind: self.kind,
      expected,
      found,
    }
  }
}

/// JSON null becomes `nil` inside scripts, so absent and null fields read
/// the same way.
fn serialize_options() -> SerializeOptions {
  SerializeOptions::new()
    .serialize_none_to_null(false)
    .serialize_unit_to_null(false)
}
