//! Which actions happen in which context

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::action::Context;
use super::frequency::Frequencies;

/// Context key -> counts of the actions performed there
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextModel {
    contexts: BTreeMap<String, Frequencies>,
}

impl ContextModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, context: &Context, action_key: &str) {
        self.contexts
            .entry(context.key())
            .or_default()
            .observe(action_key, 1);
    }

    /// Probability of each action in `context`, most likely first
    pub fn actions_in(&self, context: &Context) -> Vec<(String, f64)> {
        self.contexts
            .get(&context.key())
            .map(Frequencies::distribution)
            .unwrap_or_default()
    }

    pub fn count(&self, context: &Context, action_key: &str) -> u64 {
        self.contexts
            .get(&context.key())
            .map(|f| f.count(action_key))
            .unwrap_or(0)
    }

    /// Number of distinct contexts
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Frequencies)> {
        self.contexts.iter().map(|(k, v)| (k.as_str(), v))
    }
}
