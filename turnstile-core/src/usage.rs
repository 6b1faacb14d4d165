//! Usage deltas charged against backend metrics

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Per-metric usage increments for one call (or several merged calls).
///
/// Ordered so that serialized reports are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsageDelta(BTreeMap<String, u64>);

impl UsageDelta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Usage charging `delta` to a single metric.
    pub fn single(metric: impl Into<String>, delta: u64) -> Self {
        let mut usage = Self::new();
        usage.add(metric, delta);
        usage
    }

    /// Add `delta` to `metric`, saturating on overflow.
    pub fn add(&mut self, metric: impl Into<String>, delta: u64) {
        let slot = self.0.entry(metric.into()).or_insert(0);
        *slot = slot.saturating_add(delta);
    }

    /// Merge another delta into this one, metric by metric.
    pub fn merge(&mut self, other: &UsageDelta) {
        for (metric, delta) in &other.0 {
            self.add(metric.clone(), *delta);
        }
    }

    pub fn get(&self, metric: &str) -> u64 {
        self.0.get(metric).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl FromIterator<(String, u64)> for UsageDelta {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        let mut usage = UsageDelta::new();
        for (metric, delta) in iter {
            usage.add(metric, delta);
        }
        usage
    }
}
