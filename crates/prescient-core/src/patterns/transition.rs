//! First-order transition statistics: which action follows which

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::frequency::Frequencies;

/// Source action key -> counts of the action keys that followed it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransitionModel {
    transitions: BTreeMap<String, Frequencies>,
}

impl TransitionModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one `from -> to` transition
    pub fn observe(&mut self, from: &str, to: &str) {
        self.reinforce(from, to, 1);
    }

    /// Add `amount` to the `from -> to` count
    pub fn reinforce(&mut self, from: &str, to: &str, amount: u64) {
        self.transitions
            .entry(from.to_string())
            .or_default()
            .observe(to, amount);
    }

    /// Probability of each destination after `from`, most likely first
    pub fn next_actions(&self, from: &str) -> Vec<(String, f64)> {
        self.transitions
            .get(from)
            .map(Frequencies::distribution)
            .unwrap_or_default()
    }

    pub fn count(&self, from: &str, to: &str) -> u64 {
        self.transitions.get(from).map(|f| f.count(to)).unwrap_or(0)
    }

    /// Number of distinct source actions
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn total_observations(&self) -> u64 {
        self.transitions.values().map(Frequencies::total).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Frequencies)> {
        self.transitions.iter().map(|(k, v)| (k.as_str(), v))
    }
}
