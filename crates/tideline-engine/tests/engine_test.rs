//! Integration tests for TriggerEngine using in-process test triggers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tideline_cache::{CacheError, InMemoryKvStore, KvStore, SqliteKvStore};
use tideline_config::{TriggerOptions, WorkflowRef};
use tideline_engine::{
  ChannelNotifier, EngineConfig, EngineError, FIRST_RUN_AT_KEY, RunEvent, RunRequest, RunResult,
  SEEN_KEY, ScriptFailurePolicy, TriggerEngine, TriggerRegistry, TriggerSpec,
};
use tideline_trigger::{
  DedupHints, Trigger, TriggerError, TriggerEvent, TriggerKind, TriggerOutput, WebhookRequest,
};
use tokio_util::sync::CancellationToken;

/// Shared, swappable source data for the `feed` trigger.
#[derive(Clone, Default)]
struct Feed(Arc<Mutex<Vec<Value>>>);

impl Feed {
  fn new(items: Vec<Value>) -> Self {
    Self(Arc::new(Mutex::new(items)))
  }

  fn set(&self, items: Vec<Value>) {
    *self.0.lock().unwrap() = items;
  }

  fn items(&self) -> Vec<Value> {
    self.0.lock().unwrap().clone()
  }
}

struct FeedTrigger {
  items: Vec<Value>,
  hints: DedupHints,
  calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Trigger for FeedTrigger {
  fn kind(&self) -> TriggerKind {
    TriggerKind::Pull
  }

  fn dedup_hints(&self) -> DedupHints {
    self.hints.clone()
  }

  async fn run(&self, _event: &TriggerEvent) -> Result<TriggerOutput, TriggerError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    Ok(self.items.clone().into())
  }
}

struct FailingTrigger;

#[async_trait]
impl Trigger for FailingTrigger {
  fn kind(&self) -> TriggerKind {
    TriggerKind::Pull
  }

  async fn run(&self, _event: &TriggerEvent) -> Result<TriggerOutput, TriggerError> {
    Err(TriggerError::fetch("source unavailable"))
  }
}

struct HangingTrigger;

#[async_trait]
impl Trigger for HangingTrigger {
  fn kind(&self) -> TriggerKind {
    TriggerKind::Pull
  }

  async fn run(&self, _event: &TriggerEvent) -> Result<TriggerOutput, TriggerError> {
    tokio::time::sleep(Duration::from_secs(60)).await;
    Ok(TriggerOutput::default())
  }
}

/// Store that fails selected operations and delegates the rest.
#[derive(Clone, Default)]
struct FaultyStore {
  inner: InMemoryKvStore,
  fail_reads_of: Option<&'static str>,
  fail_writes: bool,
}

impl FaultyStore {
  fn fault(operation: &str) -> CacheError {
    CacheError::Lock {
      message: format!("{operation} unavailable"),
    }
  }
}

#[async_trait]
impl KvStore for FaultyStore {
  async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
    if let Some(suffix) = self.fail_reads_of
      && key.ends_with(suffix)
    {
      return Err(Self::fault("read"));
    }
    self.inner.get(key).await
  }

  async fn set(&self, key: &str, value: Value) -> Result<(), CacheError> {
    if self.fail_writes {
      return Err(Self::fault("write"));
    }
    self.inner.set(key, value).await
  }

  async fn delete(&self, key: &str) -> Result<(), CacheError> {
    self.inner.delete(key).await
  }

  async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
    self.inner.keys_with_prefix(prefix).await
  }

  async fn set_many(&self, entries: Vec<(String, Value)>) -> Result<(), CacheError> {
    if self.fail_writes {
      return Err(Self::fault("write"));
    }
    self.inner.set_many(entries).await
  }
}

struct Harness {
  store: InMemoryKvStore,
  feed: Feed,
  calls: Arc<AtomicUsize>,
  engine: TriggerEngine,
}

fn registry(feed: &Feed, calls: &Arc<AtomicUsize>) -> TriggerRegistry {
  let mut registry = TriggerRegistry::with_builtins();

  let source = feed.clone();
  let counter = calls.clone();
  registry.register("feed", move |_params| {
    Ok(Box::new(FeedTrigger {
      items: source.items(),
      hints: DedupHints::default(),
      calls: counter.clone(),
    }) as Box<dyn Trigger>)
  });

  let source = feed.clone();
  let counter = calls.clone();
  registry.register("keyed", move |_params| {
    Ok(Box::new(FeedTrigger {
      items: source.items(),
      hints: DedupHints::unique_by("id"),
      calls: counter.clone(),
    }) as Box<dyn Trigger>)
  });

  registry.register("failing", |_| Ok(Box::new(FailingTrigger) as Box<dyn Trigger>));
  registry.register("hanging", |_| Ok(Box::new(HangingTrigger) as Box<dyn Trigger>));
  registry
}

fn harness_with(items: Vec<Value>, config: EngineConfig) -> Harness {
  let store = InMemoryKvStore::new();
  let feed = Feed::new(items);
  let calls = Arc::new(AtomicUsize::new(0));
  let engine = TriggerEngine::new(Arc::new(store.clone()), registry(&feed, &calls), config);
  Harness {
    store,
    feed,
    calls,
    engine,
  }
}

fn harness(items: Vec<Value>) -> Harness {
  harness_with(items, EngineConfig::default())
}

fn options(value: Value) -> TriggerOptions {
  serde_json::from_value(value).unwrap()
}

fn workflow(path: &str) -> WorkflowRef {
  WorkflowRef::new(path).unwrap()
}

fn request(name: &str, options: &TriggerOptions, workflow_path: &str, event: TriggerEvent) -> RunRequest {
  RunRequest {
    trigger: TriggerSpec::new(name, options.clone()),
    workflow: workflow(workflow_path),
    event,
  }
}

async fn schedule(
  engine: &TriggerEngine,
  name: &str,
  options: &TriggerOptions,
  workflow_path: &str,
) -> Result<RunResult, EngineError> {
  engine
    .run(request(name, options, workflow_path, TriggerEvent::Schedule))
    .await
}

fn webhook(path: &str, method: &str, body: Value) -> TriggerEvent {
  TriggerEvent::Webhook {
    request: WebhookRequest::new(path, method, body),
  }
}

fn titles(result: &RunResult) -> Vec<Value> {
  result
    .items
    .iter()
    .map(|item| item.get("title").cloned().unwrap_or(Value::Null))
    .collect()
}

fn stories() -> Vec<Value> {
  vec![
    json!({"id": 1, "title": "test1"}),
    json!({"id": 2, "title": "test2"}),
  ]
}

#[tokio::test]
async fn test_rerun_yields_nothing_new() {
  let h = harness(stories());
  let opts = TriggerOptions::default();

  let first = schedule(&h.engine, "feed", &opts, "rss.yml").await.unwrap();
  assert_eq!(first.items.len(), 2);
  assert!(first.items.iter().all(|item| item.hash().is_some()));

  let second = schedule(&h.engine, "feed", &opts, "rss.yml").await.unwrap();
  assert!(second.items.is_empty());

  let forced = options(json!({"config": {"force": true}}));
  let third = schedule(&h.engine, "feed", &forced, "rss.yml").await.unwrap();
  assert_eq!(third.items.len(), 2);
}

#[tokio::test]
async fn test_new_items_emit_in_source_order() {
  let h = harness(stories());
  let opts = TriggerOptions::default();
  schedule(&h.engine, "feed", &opts, "rss.yml").await.unwrap();

  h.feed.set(vec![
    json!({"id": 4, "title": "test4"}),
    json!({"id": 3, "title": "test3"}),
    json!({"id": 1, "title": "test1"}),
  ]);
  let result = schedule(&h.engine, "feed", &opts, "rss.yml").await.unwrap();
  assert_eq!(titles(&result), vec![json!("test4"), json!("test3")]);
}

#[tokio::test]
async fn test_skip_first_records_baseline() {
  let h = harness(stories());
  let opts = options(json!({"url": "https://example.com/feed", "config": {"skipFirst": true}}));
  let wf = workflow("test2.yml");

  let before = h.engine.context(&wf, "feed", &opts).await.unwrap();
  assert!(before.is_first_run);

  let result = schedule(&h.engine, "feed", &opts, "test2.yml").await.unwrap();
  assert!(result.items.is_empty());

  let first_run_at = result.helpers.cache.get(FIRST_RUN_AT_KEY).await.unwrap();
  assert!(first_run_at.and_then(|v| v.as_i64()).unwrap() > 0);

  let after = h.engine.context(&wf, "feed", &opts).await.unwrap();
  assert!(!after.is_first_run);

  h.feed.set(vec![
    json!({"id": 1, "title": "test1"}),
    json!({"id": 3, "title": "test3"}),
  ]);
  let next = schedule(&h.engine, "feed", &opts, "test2.yml").await.unwrap();
  assert_eq!(titles(&next), vec![json!("test3")]);
}

#[tokio::test]
async fn test_first_run_with_filter_script() {
  let h = harness(vec![
    json!({"id": 1, "title": "test"}),
    json!({"id": 2, "title": "other"}),
    json!({"id": 3, "title": "another"}),
  ]);
  let opts = options(json!({
    "config": {
      "force": true,
      "filterScript": "if item.title == 'test' then\n  return true\nend",
    }
  }));
  let wf = workflow("test1.yml");

  assert!(h.engine.context(&wf, "feed", &opts).await.unwrap().is_first_run);

  let result = schedule(&h.engine, "feed", &opts, "test1.yml").await.unwrap();
  assert_eq!(titles(&result), vec![json!("test")]);

  let first_run_at = result.helpers.cache.get(FIRST_RUN_AT_KEY).await.unwrap();
  assert!(first_run_at.and_then(|v| v.as_i64()).unwrap() > 0);
  assert!(!h.engine.context(&wf, "feed", &opts).await.unwrap().is_first_run);
}

#[tokio::test]
async fn test_sort_script_orders_descending() {
  let h = harness(stories());
  let opts = options(json!({"config": {"force": true, "sortScript": "\n  return b.id-a.id\n"}}));

  let result = schedule(&h.engine, "feed", &opts, "rss.yml").await.unwrap();
  assert_eq!(titles(&result), vec![json!("test2"), json!("test1")]);
}

#[tokio::test]
async fn test_format_script_and_key_field_fingerprint() {
  let h = harness(vec![
    json!({"id": 1, "title": "one"}),
    json!({"id": 2, "title": "two"}),
    json!({"id": 3, "title": "three"}),
  ]);
  let opts = options(json!({
    "config": {
      "filterScript": "item.id == 3",
      "formatScript": "{ id = item.id, title = string.upper(item.title) }",
    }
  }));

  let result = schedule(&h.engine, "keyed", &opts, "script.yml").await.unwrap();
  assert_eq!(result.items.len(), 1);
  assert_eq!(result.items[0].id(), &json!(3));
  assert_eq!(result.items[0].get("title"), Some(&json!("THREE")));
  assert_eq!(result.items[0].hash(), Some("eccbc87e4b5ce2fe28308fd9f2a7baf3"));
}

#[tokio::test]
async fn test_filtered_items_are_still_recorded() {
  let h = harness(stories());
  let filtered = options(json!({"config": {"filterScript": "item.id == 2"}}));
  let result = schedule(&h.engine, "feed", &filtered, "rss.yml").await.unwrap();
  assert_eq!(titles(&result), vec![json!("test2")]);

  let plain = TriggerOptions::default();
  let next = schedule(&h.engine, "feed", &plain, "rss.yml").await.unwrap();
  assert!(next.items.is_empty());
}

#[tokio::test]
async fn test_limit_truncates_and_records_everything() {
  let h = harness(stories());
  let opts = options(json!({"config": {"limit": 1}}));

  let first = schedule(&h.engine, "feed", &opts, "rss.yml").await.unwrap();
  assert_eq!(titles(&first), vec![json!("test1")]);

  let second = schedule(&h.engine, "feed", &opts, "rss.yml").await.unwrap();
  assert!(second.items.is_empty());
}

#[tokio::test]
async fn test_seen_set_is_capped() {
  let h = harness(vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 3})]);
  let opts = options(json!({"config": {"maxCachedItems": 2}}));

  let first = schedule(&h.engine, "feed", &opts, "rss.yml").await.unwrap();
  assert_eq!(first.items.len(), 3);

  let seen = first.helpers.cache.get(SEEN_KEY).await.unwrap().unwrap();
  assert_eq!(seen.as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn test_items_still_in_feed_are_never_evicted() {
  let h = harness(vec![]);
  let opts = options(json!({"config": {"maxCachedItems": 3}}));

  let mut emitted = Vec::new();
  for run in 1..=6 {
    h.feed.set(vec![
      json!({"id": "sticky"}),
      json!({"id": format!("n{run}")}),
    ]);
    let result = schedule(&h.engine, "feed", &opts, "rss.yml").await.unwrap();
    emitted.extend(result.items.iter().map(|item| item.id().clone()));
  }

  let sticky = emitted.iter().filter(|id| *id == &json!("sticky")).count();
  assert_eq!(sticky, 1, "emitted: {emitted:?}");
  assert_eq!(emitted.len(), 7);
}

#[tokio::test]
async fn test_cache_reset_restores_first_run() {
  let h = harness(stories());
  let opts = TriggerOptions::default();
  let wf = workflow("rss.yml");

  let first = schedule(&h.engine, "feed", &opts, "rss.yml").await.unwrap();
  assert_eq!(first.items.len(), 2);
  assert!(!h.engine.context(&wf, "feed", &opts).await.unwrap().is_first_run);

  first.helpers.cache.reset().await.unwrap();
  assert!(h.store.is_empty());
  assert!(h.engine.context(&wf, "feed", &opts).await.unwrap().is_first_run);

  let again = schedule(&h.engine, "feed", &opts, "rss.yml").await.unwrap();
  assert_eq!(again.items.len(), 2);
}

#[tokio::test]
async fn test_cache_key_partitions_history() {
  let h = harness(stories());
  let a = options(json!({"config": {"cacheKey": "a"}}));
  let b = options(json!({"config": {"cacheKey": "b"}}));

  assert_eq!(schedule(&h.engine, "feed", &a, "rss.yml").await.unwrap().items.len(), 2);
  assert_eq!(schedule(&h.engine, "feed", &b, "rss.yml").await.unwrap().items.len(), 2);
  assert!(schedule(&h.engine, "feed", &a, "rss.yml").await.unwrap().items.is_empty());
}

#[tokio::test]
async fn test_webhook_root_path() {
  let h = harness(Vec::new());
  let opts = options(json!({"deduplicationKey": "update_id", "config": {"force": true}}));
  let event = webhook(
    "/webhook/webhook/",
    "post",
    json!({"update_id": "test", "message": {"id": "test"}}),
  );

  let result = h
    .engine
    .run(request("webhook", &opts, "webhook.yml", event))
    .await
    .unwrap();
  assert_eq!(result.items.len(), 1);
  let item = result.items[0].to_value();
  assert_eq!(item["body"]["message"]["id"], json!("test"));
  assert_eq!(item["id"], json!("test"));
}

#[tokio::test]
async fn test_webhook_sub_path_with_method() {
  let h = harness(Vec::new());
  let body = json!({"update_id": "test", "message": {"id": "test"}});

  let declared = options(json!({"path": "/test", "method": "post", "config": {"force": true}}));
  let result = h
    .engine
    .run(request(
      "webhook",
      &declared,
      "webhook.yml",
      webhook("/webhook/webhook/test", "POST", body.clone()),
    ))
    .await
    .unwrap();
  assert_eq!(result.items.len(), 1);
  let item = result.items[0].to_value();
  assert_eq!(item["body"]["message"]["id"], json!("test"));
  assert_eq!(item["method"], json!("post"));

  let root = options(json!({"config": {"force": true}}));
  let ignored = h
    .engine
    .run(request(
      "webhook",
      &root,
      "webhook.yml",
      webhook("/webhook/webhook/test", "post", body),
    ))
    .await
    .unwrap();
  assert!(ignored.items.is_empty());
}

#[tokio::test]
async fn test_webhook_deduplication_key() {
  let h = harness(Vec::new());
  let opts = options(json!({"deduplicationKey": "update_id"}));

  let first = h
    .engine
    .run(request(
      "webhook",
      &opts,
      "webhook.yml",
      webhook("/webhook/webhook", "post", json!({"update_id": 10, "message": {"text": "a"}})),
    ))
    .await
    .unwrap();
  assert_eq!(first.items.len(), 1);

  let same_update = h
    .engine
    .run(request(
      "webhook",
      &opts,
      "webhook.yml",
      webhook("/webhook/webhook", "post", json!({"update_id": 10, "message": {"text": "b"}})),
    ))
    .await
    .unwrap();
  assert!(same_update.items.is_empty());

  let next_update = h
    .engine
    .run(request(
      "webhook",
      &opts,
      "webhook.yml",
      webhook("/webhook/webhook", "post", json!({"update_id": 11, "message": {"text": "b"}})),
    ))
    .await
    .unwrap();
  assert_eq!(next_update.items.len(), 1);
}

#[tokio::test]
async fn test_webhook_mismatch_writes_nothing() {
  let h = harness(Vec::new());
  let opts = options(json!({"method": "post"}));

  let wrong_method = h
    .engine
    .run(request(
      "webhook",
      &opts,
      "webhook.yml",
      webhook("/webhook/webhook", "get", json!({})),
    ))
    .await
    .unwrap();
  assert!(wrong_method.items.is_empty());

  let wrong_trigger = h
    .engine
    .run(request(
      "webhook",
      &opts,
      "webhook.yml",
      webhook("/webhook/other", "post", json!({})),
    ))
    .await
    .unwrap();
  assert!(wrong_trigger.items.is_empty());

  let schedule_event = schedule(&h.engine, "webhook", &opts, "webhook.yml").await.unwrap();
  assert!(schedule_event.items.is_empty());

  assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_pull_trigger_ignores_webhooks() {
  let h = harness(stories());
  let result = h
    .engine
    .run(request(
      "feed",
      &TriggerOptions::default(),
      "rss.yml",
      webhook("/rss/feed", "post", json!({})),
    ))
    .await
    .unwrap();
  assert!(result.items.is_empty());
  assert_eq!(h.calls.load(Ordering::SeqCst), 0);
  assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_fetch_failure_leaves_cache_untouched() {
  let h = harness(Vec::new());
  let err = schedule(&h.engine, "failing", &TriggerOptions::default(), "rss.yml")
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    EngineError::Trigger {
      source: TriggerError::Fetch { .. },
      ..
    }
  ));
  assert!(h.store.is_empty());

  let wf = workflow("rss.yml");
  let context = h
    .engine
    .context(&wf, "failing", &TriggerOptions::default())
    .await
    .unwrap();
  assert!(context.is_first_run);
}

#[tokio::test]
async fn test_fetch_timeout() {
  let h = harness(Vec::new());
  let opts = options(json!({"config": {"timeoutMs": 50}}));
  let err = schedule(&h.engine, "hanging", &opts, "rss.yml").await.unwrap_err();
  assert!(matches!(err, EngineError::Timeout { timeout_ms: 50, .. }));
  assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_cancelled_run() {
  let h = harness(Vec::new());
  let cancel = CancellationToken::new();
  let token = cancel.clone();
  tokio::spawn(async move {
    tokio::time::sleep(Duration::from_millis(20)).await;
    token.cancel();
  });

  let err = h
    .engine
    .run_with_cancel(
      request("hanging", &TriggerOptions::default(), "rss.yml", TriggerEvent::Schedule),
      cancel,
    )
    .await
    .unwrap_err();
  assert!(matches!(err, EngineError::Cancelled));
  assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_contract_violation_is_fatal() {
  let h = harness(vec![json!({"id": 1}), json!({"title": "no id"})]);
  let err = schedule(&h.engine, "feed", &TriggerOptions::default(), "rss.yml")
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    EngineError::Trigger {
      source: TriggerError::ContractViolation(_),
      ..
    }
  ));
  assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_configuration_errors_touch_nothing() {
  let h = harness(stories());

  let err = schedule(&h.engine, "rss", &TriggerOptions::default(), "rss.yml")
    .await
    .unwrap_err();
  assert!(matches!(err, EngineError::UnknownTrigger { trigger } if trigger == "rss"));

  let bad_method = options(json!({"method": "fetch"}));
  let err = schedule(&h.engine, "feed", &bad_method, "rss.yml").await.unwrap_err();
  assert!(matches!(err, EngineError::Config(_)));

  let bad_script = options(json!({"config": {"filterScript": "item.id =="}}));
  let err = schedule(&h.engine, "feed", &bad_script, "rss.yml").await.unwrap_err();
  assert!(matches!(err, EngineError::Script(_)));

  assert_eq!(h.calls.load(Ordering::SeqCst), 0);
  assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_inactive_trigger_is_skipped() {
  let h = harness(stories());
  let opts = options(json!({"config": {"active": false}}));

  let result = schedule(&h.engine, "feed", &opts, "rss.yml").await.unwrap();
  assert!(result.items.is_empty());
  assert_eq!(h.calls.load(Ordering::SeqCst), 0);
  assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_script_failures_skip_items_by_default() {
  let h = harness(vec![
    json!({"id": 1, "title": "a"}),
    json!({"id": 2}),
  ]);
  let opts = options(json!({"config": {"filterScript": "string.len(item.title) > 0"}}));

  let result = schedule(&h.engine, "feed", &opts, "rss.yml").await.unwrap();
  assert_eq!(titles(&result), vec![json!("a")]);
}

#[tokio::test]
async fn test_script_abort_policy_leaves_cache_untouched() {
  let config = EngineConfig {
    script_failure: ScriptFailurePolicy::Abort,
    ..EngineConfig::default()
  };
  let h = harness_with(stories(), config);
  let opts = options(json!({"config": {"filterScript": "error('broken filter')"}}));

  let err = schedule(&h.engine, "feed", &opts, "rss.yml").await.unwrap_err();
  assert!(matches!(err, EngineError::Script(_)));
  assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_schedule_builtin_emits_every_tick() {
  let h = harness(Vec::new());
  let opts = TriggerOptions::default();

  let first = schedule(&h.engine, "schedule", &opts, "cron.yml").await.unwrap();
  assert_eq!(first.items.len(), 1);
  assert!(first.helpers.cache.get(FIRST_RUN_AT_KEY).await.unwrap().is_some());
  assert!(first.helpers.cache.get(SEEN_KEY).await.unwrap().is_none());

  tokio::time::sleep(Duration::from_millis(2)).await;
  let second = schedule(&h.engine, "schedule", &opts, "cron.yml").await.unwrap();
  assert_eq!(second.items.len(), 1);
}

#[tokio::test]
async fn test_notifier_receives_run_events() {
  let store = InMemoryKvStore::new();
  let feed = Feed::new(stories());
  let calls = Arc::new(AtomicUsize::new(0));
  let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
  let engine = TriggerEngine::with_notifier(
    Arc::new(store),
    registry(&feed, &calls),
    EngineConfig::default(),
    ChannelNotifier::new(tx),
  );

  engine
    .run(request("feed", &TriggerOptions::default(), "rss.yml", TriggerEvent::Schedule))
    .await
    .unwrap();

  let mut events = Vec::new();
  while let Ok(event) = rx.try_recv() {
    events.push(event);
  }
  assert!(matches!(events[0], RunEvent::RunStarted { .. }));
  assert!(matches!(events[1], RunEvent::ItemsFetched { count: 2, .. }));
  assert!(matches!(
    events[2],
    RunEvent::ItemsReconciled {
      fresh: 2,
      duplicates: 0,
      ..
    }
  ));
  assert!(matches!(events[3], RunEvent::RunCompleted { emitted: 2, .. }));
}

#[tokio::test]
async fn test_sqlite_store_persists_across_engines() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("cache.db");
  let feed = Feed::new(stories());
  let calls = Arc::new(AtomicUsize::new(0));
  let opts = TriggerOptions::default();

  {
    let store: Arc<dyn KvStore> = Arc::new(SqliteKvStore::open(&path).await.unwrap());
    let engine = TriggerEngine::new(store, registry(&feed, &calls), EngineConfig::default());
    let result = schedule(&engine, "feed", &opts, "rss.yml").await.unwrap();
    assert_eq!(result.items.len(), 2);
  }

  let store: Arc<dyn KvStore> = Arc::new(SqliteKvStore::open(&path).await.unwrap());
  let engine = TriggerEngine::new(store, registry(&feed, &calls), EngineConfig::default());
  let wf = workflow("rss.yml");
  assert!(!engine.context(&wf, "feed", &opts).await.unwrap().is_first_run);

  let result = schedule(&engine, "feed", &opts, "rss.yml").await.unwrap();
  assert!(result.items.is_empty());
}

fn faulty_engine(store: FaultyStore) -> TriggerEngine {
  let feed = Feed::new(stories());
  let calls = Arc::new(AtomicUsize::new(0));
  TriggerEngine::new(
    Arc::new(store),
    registry(&feed, &calls),
    EngineConfig::default(),
  )
}

#[tokio::test]
async fn test_failed_commit_fails_the_run() {
  let store = FaultyStore {
    fail_writes: true,
    ..FaultyStore::default()
  };
  let inner = store.inner.clone();
  let engine = faulty_engine(store);

  let result = schedule(&engine, "feed", &TriggerOptions::default(), "rss.yml").await;
  assert!(
    matches!(result, Err(EngineError::Cache(CacheError::Lock { .. }))),
    "{result:?}"
  );
  assert!(inner.is_empty());

  // Nothing was recorded, so a healthy store sees the same first run.
  let engine = TriggerEngine::new(
    Arc::new(inner),
    registry(&Feed::new(stories()), &Arc::new(AtomicUsize::new(0))),
    EngineConfig::default(),
  );
  let retry = schedule(&engine, "feed", &TriggerOptions::default(), "rss.yml").await.unwrap();
  assert_eq!(retry.items.len(), 2);
}

#[tokio::test]
async fn test_failed_seen_set_read_fails_the_run() {
  let store = FaultyStore {
    fail_reads_of: Some(SEEN_KEY),
    ..FaultyStore::default()
  };
  let inner = store.inner.clone();
  let engine = faulty_engine(store);

  let result = schedule(&engine, "feed", &TriggerOptions::default(), "rss.yml").await;
  assert!(
    matches!(result, Err(EngineError::Cache(CacheError::Lock { .. }))),
    "{result:?}"
  );
  assert!(inner.is_empty());
}

#[tokio::test]
async fn test_failed_context_read_fails_the_run() {
  let store = FaultyStore {
    fail_reads_of: Some(FIRST_RUN_AT_KEY),
    ..FaultyStore::default()
  };
  let engine = faulty_engine(store);

  let result = schedule(&engine, "feed", &TriggerOptions::default(), "rss.yml").await;
  assert!(matches!(result, Err(EngineError::Cache(_))), "{result:?}");
}
