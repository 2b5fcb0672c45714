//! Simulated query backend for replays

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use prescient_core::{QueryClient, QueryError};
use serde_json::{json, Value};

/// Answers every query after a fixed latency
///
/// Failures are a deterministic function of the query text, so the same
/// query fails on every replay while roughly `fail_rate` of distinct
/// queries fail overall.
pub struct SimulatedClient {
    latency: Duration,
    fail_rate: f64,
    calls: AtomicU64,
    failures: AtomicU64,
}

impl SimulatedClient {
    pub fn new(latency: Duration, fail_rate: f64) -> Self {
        Self {
            latency,
            fail_rate: fail_rate.clamp(0.0, 1.0),
            calls: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Queries received so far
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Queries answered with an error so far
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    fn should_fail(&self, query: &str) -> bool {
        if self.fail_rate <= 0.0 {
            return false;
        }
        let mut hasher = DefaultHasher::new();
        query.hash(&mut hasher);
        let bucket = (hasher.finish() % 10_000) as f64 / 10_000.0;
        bucket < self.fail_rate
    }
}

impl QueryClient for SimulatedClient {
    fn query<'a>(
        &'a self,
        query: &'a str,
        variables: Option<&'a Value>,
    ) -> BoxFuture<'a, Result<Value, QueryError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::Relaxed);
            tokio::time::sleep(self.latency).await;

            if self.should_fail(query) {
                self.failures.fetch_add(1, Ordering::Relaxed);
                return Err(QueryError::Failed(format!("simulated failure for {query}")));
            }

            Ok(json!({
                "query": query,
                "variables": variables.cloned().unwrap_or(Value::Null),
                "results": [{ "value": query.len() }],
                "generatedAt": Utc::now().to_rfc3339(),
            }))
        })
    }
}
