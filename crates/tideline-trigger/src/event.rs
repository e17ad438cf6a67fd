use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// What caused an invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerEvent {
  /// A scheduler tick. Pull triggers fetch from their source.
  Schedule,

  /// An inbound HTTP call. Push triggers derive items from it.
  Webhook { request: WebhookRequest },
}

impl TriggerEvent {
  /// Short name used in logs and events.
  pub fn kind(&self) -> &'static str {
    match self {
      Self::Schedule => "schedule",
      Self::Webhook { .. } => "webhook",
    }
  }
}

/// A normalized inbound webhook call.
///
/// Exists only for the duration of one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookRequest {
  /// Path without query string.
  pub path: String,

  /// HTTP method, lowercased.
  pub method: String,

  /// Parsed request body (`null` when there is none).
  #[serde(default)]
  pub body: serde_json::Value,

  /// Query string parameters. Repeated keys keep the last value.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub query: BTreeMap<String, String>,

  /// Request headers with lowercased names.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub headers: BTreeMap<String, String>,
}

impl WebhookRequest {
  /// Build a request from a raw path that may carry a query string.
  pub fn new(raw_path: &str, method: &str, body: serde_json::Value) -> Self {
    let (path, query) = match raw_path.split_once('?') {
      Some((path, query)) => (path, parse_query(query)),
      None => (raw_path, BTreeMap::new()),
    };

    Self {
      path: path.to_string(),
      method: method.to_ascii_lowercase(),
      body,
      query,
      headers: BTreeMap::new(),
    }
  }

  /// Attach headers, normalizing names to lowercase.
  pub fn with_headers<K, V>(mut self, headers: impl IntoIterator<Item = (K, V)>) -> Self
  where
    K: AsRef<str>,
    V: Into<String>,
  {
    self.headers = headers
      .into_iter()
      .map(|(name, value)| (name.as_ref().to_ascii_lowercase(), value.into()))
      .collect();
    self
  }

  /// Look up a header by case-insensitive name.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .get(&name.to_ascii_lowercase())
      .map(String::as_str)
  }
}

fn parse_query(query: &str) -> BTreeMap<String, String> {
  url::form_urlencoded::parse(query.as_bytes())
    .map(|(key, value)| (key.into_owned(), value.into_owned()))
    .collect()
}
