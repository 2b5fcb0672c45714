//! Observed user actions and the context they happen in

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder for an absent context segment in a context key
const EMPTY_SEGMENT: &str = "_";

/// Where an action occurred
///
/// `dashboard`, `widget` and `view` identify the location and make up the
/// context key. `filter` and `time_range` don't; they only override how
/// predicted queries are rendered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Context {
    pub dashboard: Option<String>,
    pub widget: Option<String>,
    pub view: Option<String>,
    /// Extra query condition, e.g. `appName = 'checkout'`
    pub filter: Option<String>,
    /// Time window for rendered queries, e.g. `30 minutes ago`
    pub time_range: Option<String>,
}

impl Context {
    /// Context scoped to a dashboard
    pub fn dashboard(id: impl Into<String>) -> Self {
        Self {
            dashboard: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn with_widget(mut self, id: impl Into<String>) -> Self {
        self.widget = Some(id.into());
        self
    }

    pub fn with_view(mut self, view: impl Into<String>) -> Self {
        self.view = Some(view.into());
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_time_range(mut self, range: impl Into<String>) -> Self {
        self.time_range = Some(range.into());
        self
    }

    /// Canonical `dashboard:widget:view` key
    pub fn key(&self) -> String {
        let segment = |s: &Option<String>| s.as_deref().unwrap_or(EMPTY_SEGMENT).to_string();
        format!(
            "{}:{}:{}",
            segment(&self.dashboard),
            segment(&self.widget),
            segment(&self.view)
        )
    }
}

/// An action reported by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    /// Kind of interaction, also the query template prefix (`metric`, `event`, `view`)
    #[serde(rename = "type")]
    pub action_type: String,
    /// What was interacted with
    pub target: String,
    #[serde(default)]
    pub context: Context,
    /// Outcome reported by the caller, used for reinforcement
    #[serde(default)]
    pub success: Option<bool>,
}

impl Action {
    pub fn new(action_type: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            target: target.into(),
            context: Context::default(),
            success: None,
        }
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn with_success(mut self, success: bool) -> Self {
        self.success = Some(success);
        self
    }

    /// `type:target` key used by every model
    pub fn key(&self) -> String {
        action_key(&self.action_type, &self.target)
    }
}

/// Build the `type:target` key
pub fn action_key(action_type: &str, target: &str) -> String {
    format!("{}:{}", action_type, target)
}

/// An action as recorded in the history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub action_type: String,
    pub target: String,
    pub context: Context,
    pub timestamp: DateTime<Utc>,
    /// 0 = Sunday
    pub day_of_week: u32,
    pub hour_of_day: u32,
}

impl ActionRecord {
    /// Record `action` as having happened at `at`
    pub fn from_action(action: &Action, at: DateTime<Utc>) -> Self {
        Self {
            action_type: action.action_type.clone(),
            target: action.target.clone(),
            context: action.context.clone(),
            timestamp: at,
            day_of_week: at.weekday().num_days_from_sunday(),
            hour_of_day: at.hour(),
        }
    }

    pub fn key(&self) -> String {
        action_key(&self.action_type, &self.target)
    }
}
