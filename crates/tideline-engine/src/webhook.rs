//! Matching inbound webhook requests to triggers.
//!
//! A trigger answers requests under `/{workflow path without extension}/{trigger name}`.
//! Whatever follows that prefix must equal the trigger's declared `path`
//! (default `/`), so `/test` is only answered by a trigger declaring it.

use serde_json::{Map, Value};
use tideline_config::{DEFAULT_WEBHOOK_PATH, TriggerOptions, WorkflowRef};
use tideline_trigger::{Item, WebhookRequest, content_digest};
use tracing::debug;

/// Route of one trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookRouter {
  prefix: String,
  path: String,
  method: Option<String>,
}

impl WebhookRouter {
  pub fn new(workflow: &WorkflowRef, trigger_name: &str, options: &TriggerOptions) -> Self {
    Self {
      prefix: normalize_path(&format!("/{}/{}", workflow.stem(), trigger_name)),
      path: normalize_path(options.path.as_deref().unwrap_or(DEFAULT_WEBHOOK_PATH)),
      method: options.method.as_ref().map(|m| m.to_ascii_lowercase()),
    }
  }

  /// Routing prefix, e.g. `/webhook/webhook`.
  pub fn prefix(&self) -> &str {
    &self.prefix
  }

  /// Declared sub-path, normalized.
  pub fn path(&self) -> &str {
    &self.path
  }

  /// Decide whether `request` is addressed to this trigger.
  ///
  /// On a match the returned request carries the sub-path relative to the
  /// trigger's root. `None` is not an error.
  pub fn route(&self, request: &WebhookRequest) -> Option<WebhookRequest> {
    let full = normalize_path(&request.path);
    let remainder = normalize_path(strip_route_prefix(&full, &self.prefix)?);

    if remainder != self.path {
      debug!(path = %full, expected = %self.path, "webhook_path_mismatch");
      return None;
    }
    if let Some(method) = &self.method
      && !request.method.eq_ignore_ascii_case(method)
    {
      debug!(method = %request.method, expected = %method, "webhook_method_mismatch");
      return None;
    }

    let mut routed = request.clone();
    routed.path = remainder;
    Some(routed)
  }
}

/// Strip `prefix` only at a segment boundary, so `/webhook` does not claim
/// `/webhooks`.
fn strip_route_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
  let rest = path.strip_prefix(prefix)?;
  if rest.is_empty() || rest.starts_with('/') {
    Some(rest)
  } else {
    None
  }
}

/// Canonical path form: one leading slash, no empty segments, no trailing
/// slash except for the root.
pub fn normalize_path(path: &str) -> String {
  let segments: Vec<&str> = path.trim().split('/').filter(|s| !s.is_empty()).collect();
  format!("/{}", segments.join("/"))
}

/// Build the single item a routed webhook request yields.
///
/// With a `deduplicationKey` the fingerprint is the digest of that body field
/// and the field doubles as the item id. Otherwise the whole body is
/// digested. The method is included when the trigger restricts it.
pub fn request_item(request: &WebhookRequest, options: &TriggerOptions) -> Value {
  let key_value = options
    .deduplication_key
    .as_deref()
    .and_then(|key| request.body.get(key));

  let (id, hash) = match key_value {
    Some(value) => {
      let hash = content_digest(value);
      let id = match value {
        Value::String(_) | Value::Number(_) => value.clone(),
        _ => Value::String(hash.clone()),
      };
      (id, hash)
    }
    None => {
      if let Some(key) = &options.deduplication_key {
        debug!(key = %key, "webhook_deduplication_key_missing");
      }
      let hash = content_digest(&request.body);
      (Value::String(hash.clone()), hash)
    }
  };

  let mut item = Map::new();
  item.insert(Item::ID.to_string(), id);
  item.insert(Item::HASH.to_string(), Value::String(hash));
  item.insert("path".to_string(), Value::String(request.path.clone()));
  if options.method.is_some() {
    item.insert("method".to_string(), Value::String(request.method.clone()));
  }
  item.insert("body".to_string(), request.body.clone());
  if !request.query.is_empty() {
    item.insert("query".to_string(), string_map(&request.query));
  }
  if !request.headers.is_empty() {
    item.insert("headers".to_string(), string_map(&request.headers));
  }
  Value::Object(item)
}

fn string_map(map: &std::collections::BTreeMap<String, String>) -> Value {
  Value::Object(
    map
      .iter()
      .map(|(k, v)| (k.clone(), Value::String(v.clone())))
      .collect(),
  )
}
