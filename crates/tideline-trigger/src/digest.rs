//! Content fingerprints.
//!
//! A fingerprint is the lowercase hex MD5 of a value's canonical form.
//! Strings are hashed as their raw text; everything else is hashed as JSON
//! with object keys sorted, so key order in the source never matters.

use serde_json::Value;

/// Fingerprint a JSON value.
pub fn content_digest(value: &Value) -> String {
  let canonical = match value {
    Value::String(text) => text.clone(),
    other => canonical_json(other),
  };
  format!("{:x}", md5::compute(canonical.as_bytes()))
}

/// Serialize a value as compact JSON with object keys in sorted order.
pub fn canonical_json(value: &Value) -> String {
  let mut out = String::new();
  write_canonical(value, &mut out);
  out
}

fn write_canonical(value: &Value, out: &mut String) {
  match value {
    Value::Object(map) => {
      let mut keys: Vec<&String> = map.keys().collect();
      keys.sort();
      out.push('{');
      for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        out.push_str(&Value::String(key.clone()).to_string());
        out.push(':');
        write_canonical(&map[key], out);
      }
      out.push('}');
    }
    Value::Array(items) => {
      out.push('[');
      for (i, item) in items.iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        write_canonical(item, out);
      }
      out.push(']');
    }
    scalar => out.push_str(&scalar.to_string()),
  }
}
