//! Observation counts shared by all pattern models

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Counts of observed action keys
///
/// Ordered so that equal-probability outcomes come out in a stable order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Frequencies(BTreeMap<String, u64>);

impl Frequencies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `amount` observations of `key`
    pub fn observe(&mut self, key: &str, amount: u64) {
        *self.0.entry(key.to_string()).or_insert(0) += amount;
    }

    pub fn count(&self, key: &str) -> u64 {
        self.0.get(key).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    /// Number of distinct keys observed
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Relative frequency of every key, most likely first
    pub fn distribution(&self) -> Vec<(String, f64)> {
        let total = self.total();
        if total == 0 {
            return Vec::new();
        }

        let mut dist: Vec<(String, f64)> = self
            .0
            .iter()
            .map(|(key, count)| (key.clone(), *count as f64 / total as f64))
            .collect();
        dist.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        dist
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}
