//! Turning predicted action keys back into executable queries

use std::collections::HashMap;

use super::action::Context;

/// Time window used when the context doesn't supply one
pub const DEFAULT_TIME_RANGE: &str = "1 hour ago";

/// Renders the query for one action type
///
/// Receives the action target, the optional extra filter and the time range.
pub type TemplateFn = fn(target: &str, filter: Option<&str>, range: &str) -> String;

/// Registry of query templates keyed by action type
#[derive(Clone)]
pub struct QueryTemplates {
    templates: HashMap<String, TemplateFn>,
}

impl std::fmt::Debug for QueryTemplates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut prefixes: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        prefixes.sort_unstable();
        f.debug_struct("QueryTemplates")
            .field("prefixes", &prefixes)
            .finish()
    }
}

impl Default for QueryTemplates {
    fn default() -> Self {
        let mut templates = Self::empty();
        templates.register("metric", metric_template);
        templates.register("event", event_template);
        templates.register("view", view_template);
        templates
    }
}

impl QueryTemplates {
    /// Registry with no templates; every reconstruction yields `None`
    pub fn empty() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    /// Add or replace the template for `prefix`
    pub fn register(&mut self, prefix: impl Into<String>, template: TemplateFn) {
        self.templates.insert(prefix.into(), template);
    }

    pub fn supports(&self, prefix: &str) -> bool {
        self.templates.contains_key(prefix)
    }

    /// Render the query for a `type:target` key
    ///
    /// Returns `None` for a malformed key or an unregistered type. When
    /// `overrides` is given, its filter and time range shape the query.
    pub fn reconstruct(&self, action_key: &str, overrides: Option<&Context>) -> Option<String> {
        let (prefix, target) = action_key.split_once(':')?;
        if target.is_empty() {
            return None;
        }
        let template = self.templates.get(prefix)?;

        let filter = overrides.and_then(|c| c.filter.as_deref());
        let range = overrides
            .and_then(|c| c.time_range.as_deref())
            .unwrap_or(DEFAULT_TIME_RANGE);

        Some(template(target, filter, range))
    }
}

fn where_clause(filter: Option<&str>) -> String {
    filter.map(|f| format!(" WHERE {}", f)).unwrap_or_default()
}

fn metric_template(target: &str, filter: Option<&str>, range: &str) -> String {
    format!(
        "SELECT average({}) FROM Metric{} SINCE {}",
        target,
        where_clause(filter),
        range
    )
}

fn event_template(target: &str, filter: Option<&str>, range: &str) -> String {
    format!(
        "SELECT count(*) FROM {}{} SINCE {}",
        target,
        where_clause(filter),
        range
    )
}

fn view_template(target: &str, filter: Option<&str>, range: &str) -> String {
    let extra = filter.map(|f| format!(" AND {}", f)).unwrap_or_default();
    format!(
        "SELECT * FROM DashboardData WHERE target = '{}'{} SINCE {}",
        target.replace('\'', "\\'"),
        extra,
        range
    )
}
