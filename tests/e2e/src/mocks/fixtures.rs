//! Test Data Factory
//!
//! Builds realistic dashboard sessions:
//! - Single actions of each template kind
//! - Repeating navigation loops for training the transition model
//! - The query a given action renders to

use prescient_core::{Action, Context, QueryTemplates};

/// Factory for actions and sessions
///
/// # Example
///
/// ```rust,ignore
/// let session = TestDataFactory::navigation_loop(&TestDataFactory::ops_cycle(), 5);
/// for action in &session {
///     fetcher.track_action(action)?;
/// }
/// ```
pub struct TestDataFactory;

impl TestDataFactory {
    pub fn metric(name: &str, dashboard: &str) -> Action {
        Action::new("metric", name).with_context(Context::dashboard(dashboard).with_widget(name))
    }

    pub fn event(name: &str, dashboard: &str) -> Action {
        Action::new("event", name).with_context(Context::dashboard(dashboard).with_widget(name))
    }

    pub fn view(target: &str, dashboard: &str) -> Action {
        Action::new("view", target).with_context(Context::dashboard(dashboard))
    }

    /// One pass over the ops dashboard: overview, cpu, memory, errors
    pub fn ops_cycle() -> Vec<Action> {
        vec![
            Self::view("overview", "ops"),
            Self::metric("cpuPercent", "ops"),
            Self::metric("memoryPercent", "ops"),
            Self::event("TransactionError", "ops"),
        ]
    }

    /// `cycle` repeated `times` times
    pub fn navigation_loop(cycle: &[Action], times: usize) -> Vec<Action> {
        cycle
            .iter()
            .cloned()
            .cycle()
            .take(cycle.len() * times)
            .collect()
    }

    /// `count` distinct metric actions on one dashboard
    pub fn distinct_metrics(count: usize, dashboard: &str) -> Vec<Action> {
        (0..count)
            .map(|i| Self::metric(&format!("metric{i}"), dashboard))
            .collect()
    }

    /// The query `action` renders to with the default templates
    pub fn query_for(action: &Action) -> String {
        QueryTemplates::default()
            .reconstruct(&action.key(), Some(&action.context))
            .expect("action has a default template")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation_loop_repeats_in_order() {
        let cycle = TestDataFactory::ops_cycle();
        let session = TestDataFactory::navigation_loop(&cycle, 3);

        assert_eq!(session.len(), 12);
        assert_eq!(session[4], cycle[0]);
        assert_eq!(session[11], cycle[3]);
    }

    #[test]
    fn test_query_for_metric() {
        let query = TestDataFactory::query_for(&TestDataFactory::metric("cpuPercent", "ops"));
        assert_eq!(query, "SELECT average(cpuPercent) FROM Metric SINCE 1 hour ago");
    }
}
