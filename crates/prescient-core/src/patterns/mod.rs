//! Pattern Analysis
//!
//! Learns, from a bounded history of past actions, what the user is likely
//! to request next. Three independent models feed the predictions:
//!
//! - **Transitions**: first-order statistics of which action follows which
//! - **Context**: which actions happen on which dashboard/widget/view
//! - **Time**: which actions happen at this hour of day and day of week
//!
//! Predicted action keys are turned back into executable queries through
//! [`QueryTemplates`]; keys with no template are dropped.

mod action;
mod analyzer;
mod context;
mod frequency;
mod temporal;
mod templates;
mod transition;

pub use action::{action_key, Action, ActionRecord, Context};
pub use analyzer::{
    combine_predictions, AnalyzerStats, PatternAnalyzer, CONTEXT_WEIGHT, DAILY_WEIGHT,
    DEFAULT_ANALYSIS_WINDOW, HOURLY_WEIGHT, MAX_PREDICTIONS, PATTERNS_KEY,
};
pub use context::ContextModel;
pub use frequency::Frequencies;
pub use temporal::TimeModel;
pub use templates::{QueryTemplates, TemplateFn, DEFAULT_TIME_RANGE};
pub use transition::TransitionModel;

use serde::{Deserialize, Serialize};

/// Which model produced a prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PredictionSource {
    Transition,
    Context,
    TimeHourly,
    TimeDaily,
}

impl PredictionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transition => "transition",
            Self::Context => "context",
            Self::TimeHourly => "time-hourly",
            Self::TimeDaily => "time-daily",
        }
    }
}

impl std::fmt::Display for PredictionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A query the user is predicted to need
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Rendered query, `None` when the action has no template
    pub query: Option<String>,
    /// The predicted `type:target` action
    pub action_key: String,
    /// Likelihood (0.0 to 1.0)
    pub probability: f64,
    pub source: PredictionSource,
    pub context: Context,
}
