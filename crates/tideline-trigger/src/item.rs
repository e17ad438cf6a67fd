use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TriggerError;

/// One unit of information produced by a trigger.
///
/// An item is a JSON object with a required `id` (string or number, unique
/// within one invocation) and an optional `hash` fingerprint. Every other
/// field is trigger-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Item(Map<String, Value>);

impl Item {
  pub const ID: &'static str = "id";
  pub const HASH: &'static str = "hash";

  /// Validate that a raw value is item-shaped.
  pub fn from_value(value: Value) -> Result<Self, TriggerError> {
    let map = match value {
      Value::Object(map) => map,
      other => {
        return Err(TriggerError::ContractViolation(format!(
          "item must be an object, got {}",
          type_name(&other)
        )));
      }
    };

    match map.get(Self::ID) {
      Some(Value::String(_)) | Some(Value::Number(_)) => {}
      Some(other) => {
        return Err(TriggerError::ContractViolation(format!(
          "item id must be a string or number, got {}",
          type_name(other)
        )));
      }
      None => {
        return Err(TriggerError::ContractViolation(
          "item is missing an 'id' field".to_string(),
        ));
      }
    }

    if let Some(hash) = map.get(Self::HASH)
      && !hash.is_string()
    {
      return Err(TriggerError::ContractViolation(format!(
        "item hash must be a string, got {}",
        type_name(hash)
      )));
    }

    Ok(Self(map))
  }

  /// The item's `id`.
  pub fn id(&self) -> &Value {
    &self.0[Self::ID]
  }

  /// The `id` rendered as text, for logging and error messages.
  pub fn id_string(&self) -> String {
    match self.id() {
      Value::String(id) => id.clone(),
      other => other.to_string(),
    }
  }

  /// The declared fingerprint, if any.
  pub fn hash(&self) -> Option<&str> {
    self.0.get(Self::HASH).and_then(|v| v.as_str())
  }

  pub fn set_hash(&mut self, hash: impl Into<String>) {
    self.0.insert(Self::HASH.to_string(), Value::String(hash.into()));
  }

  /// Look up a payload field.
  pub fn get(&self, field: &str) -> Option<&Value> {
    self.0.get(field)
  }

  pub fn as_map(&self) -> &Map<String, Value> {
    &self.0
  }

  /// A copy of the item as a JSON value (what scripts get to see).
  pub fn to_value(&self) -> Value {
    Value::Object(self.0.clone())
  }

  pub fn into_value(self) -> Value {
    Value::Object(self.0)
  }
}

impl TryFrom<Value> for Item {
  type Error = TriggerError;

  fn try_from(value: Value) -> Result<Self, Self::Error> {
    Self::from_value(value)
  }
}

impl From<Item> for Value {
  fn from(item: Item) -> Self {
    item.into_value()
  }
}

fn type_name(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "boolean",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}
