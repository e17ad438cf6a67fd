//! Trigger execution engine.
//!
//! [`TriggerEngine::run`] drives one invocation end to end:
//!
//! ```text
//! validate options ─► resolve context ─► create plugin ─► route event
//!        ─► fetch (timeout, cancel) ─► reconcile ─► scripts ─► commit
//! ```
//!
//! Nothing is written to the cache before the final commit, which stores the
//! seen set and `firstRunAt` in one `set_many` call.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Value, json};
use tideline_cache::{KvStore, TriggerCache};
use tideline_config::{TriggerConfig, TriggerOptions, WorkflowRef};
use tideline_script::ScriptSandbox;
use tideline_trigger::{
  Item, Trigger, TriggerContext, TriggerEvent, TriggerKind, TriggerOutput, TriggerParams,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::EngineConfig;
use crate::context::{ContextResolver, FIRST_RUN_AT_KEY, TriggerIdentity};
use crate::dedup::{DedupPolicy, Reconciler, SEEN_KEY, SeenSet};
use crate::error::EngineError;
use crate::events::{NoopNotifier, RunEvent, RunNotifier};
use crate::pipeline;
use crate::registry::TriggerRegistry;
use crate::webhook::WebhookRouter;

/// The trigger half of a run request.
#[derive(Debug, Clone)]
pub struct TriggerSpec {
  /// Registry name, e.g. `webhook`.
  pub name: String,
  pub options: TriggerOptions,
}

impl TriggerSpec {
  pub fn new(name: impl Into<String>, options: TriggerOptions) -> Self {
    Self {
      name: name.into(),
      options,
    }
  }
}

/// One invocation of one trigger.
#[derive(Debug, Clone)]
pub struct RunRequest {
  pub trigger: TriggerSpec,
  pub workflow: WorkflowRef,
  pub event: TriggerEvent,
}

/// Handles returned to the caller alongside the items.
#[derive(Debug, Clone)]
pub struct RunHelpers {
  /// The trigger's cache namespace, for introspection or `reset()`.
  pub cache: TriggerCache,
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct RunResult {
  /// New items, after deduplication and scripts.
  pub items: Vec<Item>,
  pub helpers: RunHelpers,
}

/// The trigger execution engine.
///
/// Generic over `N: RunNotifier`. Use `TriggerEngine::new()` for an engine
/// that discards run events, or `TriggerEngine::with_notifier()` to observe
/// them.
pub struct TriggerEngine<N: RunNotifier = NoopNotifier> {
  resolver: ContextResolver,
  registry: TriggerRegistry,
  sandbox: ScriptSandbox,
  config: EngineConfig,
  notifier: N,
}

impl TriggerEngine<NoopNotifier> {
  pub fn new(store: Arc<dyn KvStore>, registry: TriggerRegistry, config: EngineConfig) -> Self {
    Self::with_notifier(store, registry, config, NoopNotifier)
  }
}

impl<N: RunNotifier> TriggerEngine<N> {
  pub fn with_notifier(
    store: Arc<dyn KvStore>,
    registry: TriggerRegistry,
    config: EngineConfig,
    notifier: N,
  ) -> Self {
    Self {
      resolver: ContextResolver::new(store),
      registry,
      sandbox: ScriptSandbox::new(config.script_budget),
      config,
      notifier,
    }
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  pub fn registry(&self) -> &TriggerRegistry {
    &self.registry
  }

  /// Resolve the context a trigger would be constructed with right now.
  pub async fn context(
    &self,
    workflow: &WorkflowRef,
    trigger_name: &str,
    options: &TriggerOptions,
  ) -> Result<TriggerContext, EngineError> {
    let identity = TriggerIdentity::new(workflow, trigger_name, options)?;
    let (context, _) = self.resolver.resolve(&identity).await?;
    Ok(context)
  }

  /// The cache handle of a trigger, without running it.
  pub fn cache(
    &self,
    workflow: &WorkflowRef,
    trigger_name: &str,
    options: &TriggerOptions,
  ) -> Result<TriggerCache, EngineError> {
    let identity = TriggerIdentity::new(workflow, trigger_name, options)?;
    Ok(self.resolver.cache(&identity))
  }

  /// Run a trigger once.
  pub async fn run(&self, request: RunRequest) -> Result<RunResult, EngineError> {
    self.run_with_cancel(request, CancellationToken::new()).await
  }

  /// Run a trigger once, aborting the fetch when `cancel` fires.
  ///
  /// A failed or cancelled run leaves the trigger's cache untouched.
  #[instrument(
    name = "trigger_run",
    skip(self, request, cancel),
    fields(
      trigger = %request.trigger.name,
      workflow = %request.workflow,
      event = request.event.kind(),
    )
  )]
  pub async fn run_with_cancel(
    &self,
    request: RunRequest,
    cancel: CancellationToken,
  ) -> Result<RunResult, EngineError> {
    let RunRequest {
      trigger,
      workflow,
      event,
    } = request;

    // Configuration errors surface before any cache access.
    trigger.options.validate()?;
    if !self.registry.contains(&trigger.name) {
      return Err(EngineError::UnknownTrigger {
        trigger: trigger.name,
      });
    }
    let identity = TriggerIdentity::new(&workflow, &trigger.name, &trigger.options)?;
    pipeline::check_scripts(&self.sandbox, &trigger.options.config)?;

    let cache = self.resolver.cache(&identity);
    let helpers = RunHelpers {
      cache: cache.clone(),
    };

    if !trigger.options.config.active {
      info!(trigger = %trigger.name, "trigger_inactive");
      return Ok(RunResult {
        items: Vec::new(),
        helpers,
      });
    }

    let identity_id = identity.id();
    self.notifier.notify(RunEvent::RunStarted {
      identity: identity_id.clone(),
      trigger: trigger.name.clone(),
      event: event.kind().to_string(),
    });
    info!(identity = %identity_id, "trigger_run_started");

    let result = self
      .execute(&trigger, &workflow, &identity, event, &cancel)
      .await;

    match &result {
      Ok(items) => {
        info!(identity = %identity_id, emitted = items.len(), "trigger_run_completed");
        self.notifier.notify(RunEvent::RunCompleted {
          identity: identity_id,
          emitted: items.len(),
        });
      }
      Err(e) => {
        error!(identity = %identity_id, error = %e, "trigger_run_failed");
        self.notifier.notify(RunEvent::RunFailed {
          identity: identity_id,
          error: e.to_string(),
        });
      }
    }

    result.map(|items| RunResult { items, helpers })
  }

  async fn execute(
    &self,
    trigger: &TriggerSpec,
    workflow: &WorkflowRef,
    identity: &TriggerIdentity,
    event: TriggerEvent,
    cancel: &CancellationToken,
  ) -> Result<Vec<Item>, EngineError> {
    let identity_id = identity.id();
    let (context, cache) = self.resolver.resolve(identity).await?;

    let plugin = self
      .registry
      .create(
        &trigger.name,
        TriggerParams {
          context: context.clone(),
          options: trigger.options.clone(),
          cache: cache.clone(),
        },
      )
      .map_err(|e| EngineError::trigger(&trigger.name, e))?;

    let Some(event) = self.route(plugin.kind(), workflow, trigger, &identity_id, event) else {
      return Ok(Vec::new());
    };

    let output = self.fetch(plugin.as_ref(), &event, trigger, cancel).await?;
    self.notifier.notify(RunEvent::ItemsFetched {
      identity: identity_id.clone(),
      count: output.items.len(),
    });
    debug!(count = output.items.len(), "trigger_items_fetched");

    let items = output
      .items
      .into_iter()
      .map(Item::from_value)
      .collect::<Result<Vec<_>, _>>()
      .map_err(|e| EngineError::trigger(&trigger.name, e))?;

    let config = &trigger.options.config;
    let hints = plugin.dedup_hints();
    let should_deduplicate = hints.should_deduplicate;
    let seen = if should_deduplicate {
      SeenSet::load(&cache).await?
    } else {
      SeenSet::new()
    };

    let reconciler = Reconciler::new(DedupPolicy {
      hints,
      force: config.force,
      skip_first: config.skip_first,
      is_first_run: context.is_first_run,
    });
    let mut reconciliation = reconciler.reconcile(items, seen);
    self.notifier.notify(RunEvent::ItemsReconciled {
      identity: identity_id.clone(),
      fresh: reconciliation.fresh.len(),
      duplicates: reconciliation.duplicates,
    });
    if reconciliation.baseline {
      info!(
        recorded = reconciliation.seen.len(),
        "trigger_first_run_baseline"
      );
    }

    let items = if reconciliation.fresh.is_empty() {
      Vec::new()
    } else {
      self.apply_scripts(config, &context, &identity_id, reconciliation.fresh)?
    };

    let cap = config.max_cached_items.unwrap_or(self.config.max_cached_items);
    let evicted = reconciliation.seen.evict_to(cap);
    if evicted > 0 {
      debug!(evicted, cap, "trigger_seen_set_evicted");
    }

    let mut entries: Vec<(&str, Value)> = Vec::with_capacity(2);
    if should_deduplicate {
      entries.push((SEEN_KEY, reconciliation.seen.to_value()));
    }
    if context.is_first_run {
      entries.push((FIRST_RUN_AT_KEY, json!(Utc::now().timestamp_millis())));
    }
    if !entries.is_empty() {
      cache.set_many(entries).await?;
    }

    Ok(items)
  }

  /// Decide which event, if any, the plugin sees.
  fn route(
    &self,
    kind: TriggerKind,
    workflow: &WorkflowRef,
    trigger: &TriggerSpec,
    identity_id: &str,
    event: TriggerEvent,
  ) -> Option<TriggerEvent> {
    match (kind, event) {
      (TriggerKind::Push, TriggerEvent::Webhook { request }) => {
        let router = WebhookRouter::new(workflow, &trigger.name, &trigger.options);
        match router.route(&request) {
          Some(routed) => Some(TriggerEvent::Webhook { request: routed }),
          None => {
            self.notifier.notify(RunEvent::WebhookIgnored {
              identity: identity_id.to_string(),
              path: request.path.clone(),
            });
            debug!(path = %request.path, prefix = router.prefix(), "webhook_ignored");
            None
          }
        }
      }
      (TriggerKind::Pull, TriggerEvent::Schedule) => Some(TriggerEvent::Schedule),
      (kind, event) => {
        debug!(?kind, event = event.kind(), "trigger_event_not_applicable");
        None
      }
    }
  }

  async fn fetch(
    &self,
    plugin: &dyn Trigger,
    event: &TriggerEvent,
    trigger: &TriggerSpec,
    cancel: &CancellationToken,
  ) -> Result<TriggerOutput, EngineError> {
    let timeout = trigger
      .options
      .config
      .timeout_ms
      .map(Duration::from_millis)
      .unwrap_or(self.config.fetch_timeout);

    tokio::select! {
      biased;
      _ = cancel.cancelled() => Err(EngineError::Cancelled),
      result = tokio::time::timeout(timeout, plugin.run(event)) => match result {
        Ok(output) => output.map_err(|e| EngineError::trigger(&trigger.name, e)),
        Err(_) => Err(EngineError::Timeout {
          trigger: trigger.name.clone(),
          timeout_ms: timeout.as_millis() as u64,
        }),
      },
    }
  }

  fn apply_scripts(
    &self,
    config: &TriggerConfig,
    context: &TriggerContext,
    identity_id: &str,
    items: Vec<Item>,
  ) -> Result<Vec<Item>, EngineError> {
    let context = serde_json::to_value(context).unwrap_or_default();
    let output = pipeline::apply(
      &self.sandbox,
      config,
      self.config.script_failure,
      items,
      &context,
    )?;

    for failure in &output.failures {
      warn!(
        item_id = failure.item_id.as_deref().unwrap_or("-"),
        error = %failure.error,
        "script_failed"
      );
      self.notifier.notify(RunEvent::ScriptFailed {
        identity: identity_id.to_string(),
        script: failure
          .error
          .kind()
          .map(|k| k.option_name())
          .unwrap_or("script")
          .to_string(),
        error: failure.error.to_string(),
      });
    }

    Ok(output.items)
  }
}
