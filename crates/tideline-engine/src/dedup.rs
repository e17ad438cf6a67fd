//! Deduplication of trigger items against previously seen fingerprints.

use std::collections::{HashMap, VecDeque};

use serde_json::Value;
use tideline_cache::{CacheError, TriggerCache};
use tideline_trigger::{DedupHints, Item, content_digest};

/// Cache key holding the seen fingerprints, least recently observed first.
pub const SEEN_KEY: &str = "deduplicationKeys";

/// Fingerprint of one item.
///
/// A declared `hash` wins. Otherwise the hinted key field is digested, and
/// failing that the whole item.
pub fn fingerprint(item: &Item, hints: &DedupHints) -> String {
  if let Some(hash) = item.hash() {
    return hash.to_string();
  }
  if let Some(field) = &hints.key_field
    && let Some(value) = item.get(field)
  {
    return content_digest(value);
  }
  content_digest(&item.to_value())
}

/// Fingerprints ordered by when they were last observed, bounded by eviction.
///
/// Observing a fingerprint again moves it to the back, so eviction only
/// drops fingerprints that stopped appearing in the source.
#[derive(Debug, Clone, Default)]
pub struct SeenSet {
  // Queue of (fingerprint, tick). An entry is live only while its tick
  // matches `members`; older entries for a refreshed fingerprint are stale.
  order: VecDeque<(String, u64)>,
  members: HashMap<String, u64>,
  tick: u64,
}

impl SeenSet {
  pub fn new() -> Self {
    Self::default()
  }

  /// Load the seen set of one trigger. Absent means empty.
  pub async fn load(cache: &TriggerCache) -> Result<Self, CacheError> {
    let Some(value) = cache.get(SEEN_KEY).await? else {
      return Ok(Self::new());
    };
    let Value::Array(entries) = value else {
      return Err(CacheError::corrupt(SEEN_KEY, "expected an array of fingerprints"));
    };

    let mut seen = Self::new();
    for entry in entries {
      match entry {
        Value::String(fingerprint) => {
          seen.insert(fingerprint);
        }
        other => {
          return Err(CacheError::corrupt(
            SEEN_KEY,
            format!("expected a string fingerprint, found {}", other),
          ));
        }
      }
    }
    Ok(seen)
  }

  pub fn contains(&self, fingerprint: &str) -> bool {
    self.members.contains_key(fingerprint)
  }

  /// Record an observation of a fingerprint, making it the most recent.
  /// Returns false when it was already present.
  pub fn insert(&mut self, fingerprint: String) -> bool {
    self.tick += 1;
    let is_new = self
      .members
      .insert(fingerprint.clone(), self.tick)
      .is_none();
    self.order.push_back((fingerprint, self.tick));
    is_new
  }

  /// Drop the least recently observed fingerprints until at most `cap`
  /// remain.
  pub fn evict_to(&mut self, cap: usize) -> usize {
    let mut evicted = 0;
    while self.members.len() > cap {
      let Some((oldest, tick)) = self.order.pop_front() else {
        break;
      };
      if self.members.get(&oldest) == Some(&tick) {
        self.members.remove(&oldest);
        evicted += 1;
      }
    }
    evicted
  }

  pub fn len(&self) -> usize {
    self.members.len()
  }

  pub fn is_empty(&self) -> bool {
    self.members.is_empty()
  }

  /// The stored form: a JSON array, least recently observed first.
  pub fn to_value(&self) -> Value {
    Value::Array(
      self
        .order
        .iter()
        .filter(|(fingerprint, tick)| self.members.get(fingerprint) == Some(tick))
        .map(|(fingerprint, _)| Value::String(fingerprint.clone()))
        .collect(),
    )
  }
}

/// Run-level policy the reconciler applies.
#[derive(Debug, Clone, Default)]
pub struct DedupPolicy {
  pub hints: DedupHints,
  /// Emit every item regardless of history. Fingerprints are still recorded.
  pub force: bool,
  /// On the first run, record fingerprints but emit nothing.
  pub skip_first: bool,
  pub is_first_run: bool,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone)]
pub struct Reconciliation {
  /// Items to pass on, in plugin order, each carrying its `hash`.
  pub fresh: Vec<Item>,
  /// The seen set including every fingerprint observed in this pass.
  pub seen: SeenSet,
  /// Items dropped as already seen.
  pub duplicates: usize,
  /// Whether this pass only established a first-run baseline.
  pub baseline: bool,
}

/// Decides which raw items are new.
#[derive(Debug, Clone)]
pub struct Reconciler {
  policy: DedupPolicy,
}

impl Reconciler {
  pub fn new(policy: DedupPolicy) -> Self {
    Self { policy }
  }

  /// Split `items` into fresh and already-seen ones.
  ///
  /// Pure: the caller persists `seen` once the whole run has succeeded.
  pub fn reconcile(&self, items: Vec<Item>, mut seen: SeenSet) -> Reconciliation {
    let policy = &self.policy;
    let baseline =
      policy.hints.should_deduplicate && policy.is_first_run && policy.skip_first && !policy.force;

    let mut fresh = Vec::with_capacity(items.len());
    let mut duplicates = 0;

    for mut item in items {
      let fingerprint = fingerprint(&item, &policy.hints);
      item.set_hash(fingerprint.clone());

      if !policy.hints.should_deduplicate {
        fresh.push(item);
        continue;
      }

      let is_new = seen.insert(fingerprint);
      if policy.force || is_new {
        fresh.push(item);
      } else {
        duplicates += 1;
      }
    }

    if baseline {
      fresh.clear();
    }

    Reconciliation {
      fresh,
      seen,
      duplicates,
      baseline,
    }
  }
}
