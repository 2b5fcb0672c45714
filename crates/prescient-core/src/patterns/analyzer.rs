//! Pattern analyzer: records actions, predicts the next ones, persists
//! what it learned.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::action::{Action, ActionRecord, Context};
use super::context::ContextModel;
use super::temporal::TimeModel;
use super::templates::QueryTemplates;
use super::transition::TransitionModel;
use super::{Prediction, PredictionSource};
use crate::store::PatternStore;

// ============================================================================
// CONFIGURATION CONSTANTS
// ============================================================================

/// Default number of actions kept in the history
pub const DEFAULT_ANALYSIS_WINDOW: usize = 1000;

/// Maximum predictions returned by `predict`
pub const MAX_PREDICTIONS: usize = 10;

/// Transition predictions kept before merging
const TRANSITION_LIMIT: usize = 5;

/// Context predictions kept before merging
const CONTEXT_LIMIT: usize = 3;

/// Scale applied to context frequencies
pub const CONTEXT_WEIGHT: f64 = 0.8;

/// Scale applied to hour-of-day frequencies
pub const HOURLY_WEIGHT: f64 = 0.6;

/// Scale applied to day-of-week frequencies
pub const DAILY_WEIGHT: f64 = 0.4;

/// Store key holding the serialized patterns
pub const PATTERNS_KEY: &str = "prefetch_patterns";

/// Extra count added to a transition that led to a successful action
const REINFORCEMENT_AMOUNT: u64 = 1;

// ============================================================================
// PERSISTED FORM
// ============================================================================

fn legacy_version() -> u32 {
    1
}

/// What gets written to the store
///
/// Version 1 blobs only carried the transition and context maps.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedPatterns {
    #[serde(default = "legacy_version")]
    version: u32,
    transitions: TransitionModel,
    contexts: ContextModel,
    #[serde(default)]
    time: Option<TimeModel>,
    #[serde(default)]
    saved_at: Option<DateTime<Utc>>,
}

// ============================================================================
// STATS
// ============================================================================

/// Snapshot of what the analyzer has learned
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzerStats {
    /// Actions currently held in the history
    pub sequence_count: usize,
    /// Distinct source actions in the transition model
    pub transition_model_size: usize,
    /// Distinct contexts in the context model
    pub context_model_size: usize,
    /// Transition observations across all sources
    pub transition_observations: u64,
    /// Actions recorded since construction
    pub actions_recorded: u64,
}

// ============================================================================
// ANALYZER
// ============================================================================

/// Learns interaction patterns and predicts upcoming queries
pub struct PatternAnalyzer {
    sequences: VecDeque<ActionRecord>,
    window: usize,
    transitions: TransitionModel,
    contexts: ContextModel,
    time: TimeModel,
    templates: QueryTemplates,
    store: Arc<dyn PatternStore>,
    /// Bumped on every change to the models
    revision: u64,
    saved_revision: u64,
    actions_recorded: u64,
}

impl std::fmt::Debug for PatternAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternAnalyzer")
            .field("sequences", &self.sequences.len())
            .field("window", &self.window)
            .field("transitions", &self.transitions.len())
            .field("contexts", &self.contexts.len())
            .field("revision", &self.revision)
            .field("saved_revision", &self.saved_revision)
            .finish()
    }
}

impl PatternAnalyzer {
    /// Create an analyzer keeping `window` actions, loading any stored patterns
    pub fn new(store: Arc<dyn PatternStore>, window: usize) -> Self {
        Self::with_templates(store, window, QueryTemplates::default())
    }

    /// Create an analyzer with custom query templates
    pub fn with_templates(
        store: Arc<dyn PatternStore>,
        window: usize,
        templates: QueryTemplates,
    ) -> Self {
        let mut analyzer = Self {
            sequences: VecDeque::with_capacity(window.min(DEFAULT_ANALYSIS_WINDOW)),
            window: window.max(1),
            transitions: TransitionModel::new(),
            contexts: ContextModel::new(),
            time: TimeModel::new(),
            templates,
            store,
            revision: 0,
            saved_revision: 0,
            actions_recorded: 0,
        };
        analyzer.load_patterns();
        analyzer
    }

    // ------------------------------------------------------------------------
    // Recording
    // ------------------------------------------------------------------------

    /// Record an action that happened now
    pub fn record_action(&mut self, action: &Action) {
        self.record_action_at(action, Utc::now());
    }

    /// Record an action that happened at `at`
    pub fn record_action_at(&mut self, action: &Action, at: DateTime<Utc>) {
        let record = ActionRecord::from_action(action, at);
        let key = record.key();

        if let Some(prev) = self.sequences.back() {
            self.transitions.observe(&prev.key(), &key);
        }
        self.contexts.observe(&record.context, &key);
        self.time.observe(record.hour_of_day, record.day_of_week, &key);

        self.sequences.push_back(record);
        while self.sequences.len() > self.window {
            self.sequences.pop_front();
        }

        self.actions_recorded += 1;
        self.revision += 1;
    }

    /// Reinforce the transition that led to a successful action
    ///
    /// Only the most recent transition is considered, and only when it
    /// ended in `action`. Anything else is a no-op.
    pub fn learn(&mut self, action: &Action) {
        if action.success != Some(true) {
            return;
        }

        let key = action.key();
        let len = self.sequences.len();
        if len < 2 || self.sequences[len - 1].key() != key {
            debug!(action = %key, "No transition to reinforce");
            return;
        }

        let prev = self.sequences[len - 2].key();
        self.transitions.reinforce(&prev, &key, REINFORCEMENT_AMOUNT);
        self.revision += 1;
        debug!(from = %prev, to = %key, "Reinforced transition");
    }

    // ------------------------------------------------------------------------
    // Prediction
    // ------------------------------------------------------------------------

    /// Predict the next queries for `context` at the current time
    pub fn predict(&self, context: &Context) -> Vec<Prediction> {
        self.predict_at(context, Utc::now())
    }

    /// Predict the next queries for `context` as of `now`
    pub fn predict_at(&self, context: &Context, now: DateTime<Utc>) -> Vec<Prediction> {
        let transitions = self.transition_predictions();
        let contextual = self.context_predictions(context);
        let temporal = self.time_predictions(now);

        combine_predictions(transitions.into_iter().chain(contextual).chain(temporal))
    }

    /// Top transition predictions from the most recent action
    pub fn transition_predictions(&self) -> Vec<Prediction> {
        let Some(last) = self.sequences.back() else {
            return Vec::new();
        };

        let mut predictions: Vec<Prediction> = self
            .transitions
            .next_actions(&last.key())
            .into_iter()
            .map(|(key, probability)| Prediction {
                query: self.templates.reconstruct(&key, Some(&last.context)),
                action_key: key,
                probability,
                source: PredictionSource::Transition,
                context: last.context.clone(),
            })
            .collect();
        predictions.truncate(TRANSITION_LIMIT);
        predictions
    }

    /// Top predictions from what usually happens in `context`
    pub fn context_predictions(&self, context: &Context) -> Vec<Prediction> {
        let mut predictions: Vec<Prediction> = self
            .contexts
            .actions_in(context)
            .into_iter()
            .map(|(key, frequency)| Prediction {
                query: self.templates.reconstruct(&key, Some(context)),
                action_key: key,
                probability: frequency * CONTEXT_WEIGHT,
                source: PredictionSource::Context,
                context: context.clone(),
            })
            .collect();
        predictions.truncate(CONTEXT_LIMIT);
        predictions
    }

    /// Predictions from the hour-of-day and day-of-week buckets for `now`
    pub fn time_predictions(&self, now: DateTime<Utc>) -> Vec<Prediction> {
        let hourly = self
            .time
            .hourly(now.hour())
            .into_iter()
            .map(|(key, f)| (key, f * HOURLY_WEIGHT, PredictionSource::TimeHourly));
        let daily = self
            .time
            .daily(now.weekday().num_days_from_sunday())
            .into_iter()
            .map(|(key, f)| (key, f * DAILY_WEIGHT, PredictionSource::TimeDaily));

        hourly
            .chain(daily)
            .map(|(key, probability, source)| Prediction {
                query: self.templates.reconstruct(&key, None),
                action_key: key,
                probability,
                source,
                context: Context::default(),
            })
            .collect()
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    /// Replace the in-memory models with the stored ones
    ///
    /// Missing or unreadable data leaves the analyzer empty.
    pub fn load_patterns(&mut self) {
        let raw = match self.store.get_item(PATTERNS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("No stored patterns");
                return;
            }
            Err(e) => {
                warn!("Failed to read stored patterns: {}", e);
                return;
            }
        };

        match serde_json::from_str::<PersistedPatterns>(&raw) {
            Ok(persisted) => {
                info!(
                    version = persisted.version,
                    transitions = persisted.transitions.len(),
                    contexts = persisted.contexts.len(),
                    "Loaded stored patterns"
                );
                self.transitions = persisted.transitions;
                self.contexts = persisted.contexts;
                self.time = persisted.time.unwrap_or_default();
            }
            Err(e) => {
                warn!("Ignoring corrupt stored patterns: {}", e);
            }
        }
    }

    /// Serialize the models in the stored format
    ///
    /// Pair with [`revision`](Self::revision) taken under the same borrow and
    /// hand both back to [`mark_saved`](Self::mark_saved) once written.
    pub fn export_patterns(&self) -> Option<String> {
        let persisted = PersistedPatterns {
            version: crate::PATTERN_FORMAT_VERSION,
            transitions: self.transitions.clone(),
            contexts: self.contexts.clone(),
            time: Some(self.time.clone()),
            saved_at: Some(Utc::now()),
        };

        match serde_json::to_string(&persisted) {
            Ok(raw) => Some(raw),
            Err(e) => {
                warn!("Failed to serialize patterns: {}", e);
                None
            }
        }
    }

    /// Write the models to the store
    ///
    /// Returns whether the write succeeded. Failures are logged and the
    /// analyzer keeps working from memory.
    pub fn save_patterns(&mut self) -> bool {
        let Some(raw) = self.export_patterns() else {
            return false;
        };

        match self.store.set_item(PATTERNS_KEY, &raw) {
            Ok(()) => {
                self.mark_saved(self.revision);
                debug!(bytes = raw.len(), "Saved patterns");
                true
            }
            Err(e) => {
                warn!("Failed to save patterns: {}", e);
                false
            }
        }
    }

    /// Record that the models as of `revision` reached the store
    ///
    /// Changes made after that revision keep the analyzer dirty.
    pub fn mark_saved(&mut self, revision: u64) {
        self.saved_revision = self.saved_revision.max(revision);
    }

    /// Whether anything was learned since the last successful save
    pub fn is_dirty(&self) -> bool {
        self.revision != self.saved_revision
    }

    /// Change counter for the models
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// The store patterns are loaded from and saved to
    pub fn store(&self) -> Arc<dyn PatternStore> {
        Arc::clone(&self.store)
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn stats(&self) -> AnalyzerStats {
        AnalyzerStats {
            sequence_count: self.sequences.len(),
            transition_model_size: self.transitions.len(),
            context_model_size: self.contexts.len(),
            transition_observations: self.transitions.total_observations(),
            actions_recorded: self.actions_recorded,
        }
    }

    pub fn sequences(&self) -> &VecDeque<ActionRecord> {
        &self.sequences
    }

    pub fn transitions(&self) -> &TransitionModel {
        &self.transitions
    }

    pub fn contexts(&self) -> &ContextModel {
        &self.contexts
    }

    pub fn time_model(&self) -> &TimeModel {
        &self.time
    }

    pub fn templates(&self) -> &QueryTemplates {
        &self.templates
    }
}

/// Merge predictions from every source
///
/// Predictions without a query are dropped. Repeats of a query fold into
/// the first occurrence, the running probability becoming the mean of it
/// and the newcomer. The result is sorted most likely first and capped at
/// [`MAX_PREDICTIONS`].
pub fn combine_predictions(predictions: impl IntoIterator<Item = Prediction>) -> Vec<Prediction> {
    let mut merged: Vec<Prediction> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for prediction in predictions {
        let Some(query) = prediction.query.clone() else {
            continue;
        };

        match index.get(&query) {
            Some(&i) => {
                let existing = &mut merged[i];
                existing.probability = (existing.probability + prediction.probability) / 2.0;
            }
            None => {
                index.insert(query, merged.len());
                merged.push(prediction);
            }
        }
    }

    merged.sort_by(|a, b| {
        b.probability
            .partial_cmp(&a.probability)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    merged.truncate(MAX_PREDICTIONS);
    merged
}
