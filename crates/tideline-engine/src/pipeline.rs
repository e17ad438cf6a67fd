//! Post-deduplication item pipeline: filter, format, sort, limit.

use std::cmp::Ordering;

use serde_json::Value;
use tideline_config::TriggerConfig;
use tideline_script::{ScriptError, ScriptKind, ScriptSandbox, ScriptSession, stable_sort_by};
use tideline_trigger::Item;

use crate::config::ScriptFailurePolicy;

/// A script failure that was recovered from.
#[derive(Debug, Clone)]
pub struct ScriptFailure {
  pub error: ScriptError,
  /// The item involved; for comparisons, the left-hand item.
  pub item_id: Option<String>,
}

/// Items that survived the pipeline plus the failures skipped on the way.
#[derive(Debug, Clone, Default)]
pub struct PipelineOutput {
  pub items: Vec<Item>,
  pub failures: Vec<ScriptFailure>,
}

/// Compile every script a trigger declares without running any.
pub fn check_scripts(sandbox: &ScriptSandbox, config: &TriggerConfig) -> Result<(), ScriptError> {
  for (kind, source) in declared(config) {
    sandbox.check(kind, source)?;
  }
  Ok(())
}

fn declared(config: &TriggerConfig) -> impl Iterator<Item = (ScriptKind, &str)> {
  [
    (ScriptKind::Filter, config.filter_script.as_deref()),
    (ScriptKind::Format, config.format_script.as_deref()),
    (ScriptKind::Sort, config.sort_script.as_deref()),
  ]
  .into_iter()
  .filter_map(|(kind, source)| source.map(|s| (kind, s)))
}

/// Apply the trigger's scripts and limit to deduplicated items.
///
/// Runs synchronously; sessions live only for this call. Under
/// [`ScriptFailurePolicy::Abort`] the first failure is returned.
pub fn apply(
  sandbox: &ScriptSandbox,
  config: &TriggerConfig,
  policy: ScriptFailurePolicy,
  mut items: Vec<Item>,
  context: &Value,
) -> Result<PipelineOutput, ScriptError> {
  let mut failures = Vec::new();

  if let Some(source) = &config.filter_script {
    let session = sandbox.session(ScriptKind::Filter, source)?;
    items = filter(&session, items, context, policy, &mut failures)?;
  }
  if let Some(source) = &config.format_script {
    let session = sandbox.session(ScriptKind::Format, source)?;
    items = format(&session, items, context, policy, &mut failures)?;
  }
  if let Some(source) = &config.sort_script {
    let session = sandbox.session(ScriptKind::Sort, source)?;
    items = sort(&session, items, policy, &mut failures)?;
  }
  if let Some(limit) = config.limit {
    items.truncate(limit);
  }

  Ok(PipelineOutput { items, failures })
}

fn recover(
  policy: ScriptFailurePolicy,
  failures: &mut Vec<ScriptFailure>,
  error: ScriptError,
  item: &Item,
) -> Result<(), ScriptError> {
  match policy {
    ScriptFailurePolicy::Abort => Err(error),
    ScriptFailurePolicy::Skip => {
      failures.push(ScriptFailure {
        error,
        item_id: Some(item.id_string()),
      });
      Ok(())
    }
  }
}

fn filter(
  session: &ScriptSession,
  items: Vec<Item>,
  context: &Value,
  policy: ScriptFailurePolicy,
  failures: &mut Vec<ScriptFailure>,
) -> Result<Vec<Item>, ScriptError> {
  let mut kept = Vec::with_capacity(items.len());
  for item in items {
    match session.filter(&item.to_value(), context) {
      Ok(true) => kept.push(item),
      Ok(false) => {}
      Err(error) => recover(policy, failures, error, &item)?,
    }
  }
  Ok(kept)
}

fn format(
  session: &ScriptSession,
  items: Vec<Item>,
  context: &Value,
  policy: ScriptFailurePolicy,
  failures: &mut Vec<ScriptFailure>,
) -> Result<Vec<Item>, ScriptError> {
  let mut formatted = Vec::with_capacity(items.len());
  for item in items {
    let result = session.format(&item.to_value(), context).and_then(|value| {
      Item::from_value(value).map_err(|e| ScriptError::InvalidReturn {
        kind: ScriptKind::Format,
        expected: "an item with an id",
        found: e.to_string(),
      })
    });

    match result {
      Ok(mut next) => {
        // Keep the fingerprint the item was deduplicated under.
        if next.hash().is_none()
          && let Some(hash) = item.hash()
        {
          next.set_hash(hash);
        }
        formatted.push(next);
      }
      Err(error) => recover(policy, failures, error, &item)?,
    }
  }
  Ok(formatted)
}

fn sort(
  session: &ScriptSession,
  items: Vec<Item>,
  policy: ScriptFailurePolicy,
  failures: &mut Vec<ScriptFailure>,
) -> Result<Vec<Item>, ScriptError> {
  let keyed: Vec<(Value, Item)> = items.into_iter().map(|i| (i.to_value(), i)).collect();
  let mut aborted = None;

  let sorted = stable_sort_by(keyed, &mut |a: &(Value, Item), b: &(Value, Item)| {
    if aborted.is_some() {
      return Ordering::Equal;
    }
    match session.compare(&a.0, &b.0) {
      Ok(ordering) => ordering,
      Err(error) => {
        if let Err(error) = recover(policy, failures, error, &a.1) {
          aborted = Some(error);
        }
        Ordering::Equal
      }
    }
  });

  match aborted {
    Some(error) => Err(error),
    None => Ok(sorted.into_iter().map(|(_, item)| item).collect()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn items(values: &[Value]) -> Vec<Item> {
    values.iter().cloned().map(|v| Item::from_value(v).unwrap()).collect()
  }

  fn ids(output: &PipelineOutput) -> Vec<Value> {
    output.items.iter().map(|i| i.id().clone()).collect()
  }

  fn run(
    config: &TriggerConfig,
    policy: ScriptFailurePolicy,
    input: &[Value],
  ) -> Result<PipelineOutput, ScriptError> {
    let context = json!({"isFirstRun": false});
    apply(&ScriptSandbox::default(), config, policy, items(input), &context)
  }

  #[test]
  fn test_no_scripts_is_identity() {
    let output = run(
      &TriggerConfig::default(),
      ScriptFailurePolicy::Skip,
      &[json!({"id": 2}), json!({"id": 1})],
    )
    .unwrap();
    assert_eq!(ids(&output), vec![json!(2), json!(1)]);
  }

  #[test]
  fn test_filter_then_sort_then_limit() {
    let config = TriggerConfig {
      filter_script: Some("item.id % 2 == 1".to_string()),
      sort_script: Some("return b.id - a.id".to_string()),
      limit: Some(2),
      ..TriggerConfig::default()
    };
    let input: Vec<Value> = (1..=7).map(|id| json!({"id": id})).collect();
    let output = run(&config, ScriptFailurePolicy::Skip, &input).unwrap();
    assert_eq!(ids(&output), vec![json!(7), json!(5)]);
  }

  #[test]
  fn test_filter_failure_skips_only_that_item() {
    let config = TriggerConfig {
      filter_script: Some("string.len(item.title) > 0".to_string()),
      ..TriggerConfig::default()
    };
    let output = run(
      &config,
      ScriptFailurePolicy::Skip,
      &[json!({"id": 1, "title": "a"}), json!({"id": 2}), json!({"id": 3, "title": "c"})],
    )
    .unwrap();
    assert_eq!(ids(&output), vec![json!(1), json!(3)]);
    assert_eq!(output.failures.len(), 1);
    assert_eq!(output.failures[0].item_id.as_deref(), Some("2"));
  }

  #[test]
  fn test_abort_policy_returns_error() {
    let config = TriggerConfig {
      filter_script: Some("error('nope')".to_string()),
      ..TriggerConfig::default()
    };
    let err = run(&config, ScriptFailurePolicy::Abort, &[json!({"id": 1})]).unwrap_err();
    assert!(matches!(err, ScriptError::Runtime { .. }));
  }

  #[test]
  fn test_failing_comparator_keeps_original_order() {
    let config = TriggerConfig {
      sort_script: Some("error('bad')".to_string()),
      ..TriggerConfig::default()
    };
    let output = run(
      &config,
      ScriptFailurePolicy::Skip,
      &[json!({"id": 3}), json!({"id": 1}), json!({"id": 2})],
    )
    .unwrap();
    assert_eq!(ids(&output), vec![json!(3), json!(1), json!(2)]);
    assert!(!output.failures.is_empty());
  }

  #[test]
  fn test_format_keeps_hash() {
    let config = TriggerConfig {
      format_script: Some("{ id = item.id, upper = string.upper(item.title) }".to_string()),
      ..TriggerConfig::default()
    };
    let output = run(
      &config,
      ScriptFailurePolicy::Skip,
      &[json!({"id": 1, "hash": "h1", "title": "x"})],
    )
    .unwrap();
    assert_eq!(output.items[0].to_value(), json!({"id": 1, "hash": "h1", "upper": "X"}));
  }

  #[test]
  fn test_format_without_id_is_a_failure() {
    let config = TriggerConfig {
      format_script: Some("{ title = item.title }".to_string()),
      ..TriggerConfig::default()
    };
    let output = run(&config, ScriptFailurePolicy::Skip, &[json!({"id": 1, "title": "x"})]).unwrap();
    assert!(output.items.is_empty());
    assert!(matches!(
      output.failures[0].error,
      ScriptError::InvalidReturn { kind: ScriptKind::Format, .. }
    ));
  }

  #[test]
  fn test_check_scripts_reports_compile_errors() {
    let config = TriggerConfig {
      sort_script: Some("a.id -".to_string()),
      ..TriggerConfig::default()
    };
    let err = check_scripts(&ScriptSandbox::default(), &config).unwrap_err();
    assert!(matches!(err, ScriptError::Compile { kind: ScriptKind::Sort, .. }));
  }
}
