//! Scripted query client and recording event sink

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;
use prescient_core::{EventSink, PrefetchEvent, QueryClient, QueryError};
use serde_json::{json, Value};

/// Query client answering `{"query": q, "n": call number}` after a latency
///
/// Queries registered with [`MockQueryClient::fail`] return an error.
/// Every call is logged, and the peak number of concurrent calls is tracked.
#[derive(Default)]
pub struct MockQueryClient {
    latency: Duration,
    failing: Mutex<HashSet<String>>,
    log: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockQueryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Default::default()
        }
    }

    /// Make `query` fail from now on
    pub fn fail(&self, query: &str) {
        self.failing
            .lock()
            .expect("failing set poisoned")
            .insert(query.to_string());
    }

    /// Make `query` succeed again
    pub fn heal(&self, query: &str) {
        self.failing
            .lock()
            .expect("failing set poisoned")
            .remove(query);
    }

    /// Every query received, in order
    pub fn calls(&self) -> Vec<String> {
        self.log.lock().expect("call log poisoned").clone()
    }

    pub fn call_count(&self) -> usize {
        self.log.lock().expect("call log poisoned").len()
    }

    /// How many times `query` was received
    pub fn calls_for(&self, query: &str) -> usize {
        self.log
            .lock()
            .expect("call log poisoned")
            .iter()
            .filter(|q| q.as_str() == query)
            .count()
    }

    /// Highest number of calls running at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl QueryClient for MockQueryClient {
    fn query<'a>(
        &'a self,
        query: &'a str,
        _variables: Option<&'a Value>,
    ) -> BoxFuture<'a, Result<Value, QueryError>> {
        Box::pin(async move {
            let n = {
                let mut log = self.log.lock().expect("call log poisoned");
                log.push(query.to_string());
                log.len()
            };
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let failing = self
                .failing
                .lock()
                .expect("failing set poisoned")
                .contains(query);
            if failing {
                Err(QueryError::Failed(format!("rejected: {query}")))
            } else {
                Ok(json!({ "query": query, "n": n }))
            }
        })
    }
}

/// Event sink that keeps everything it receives
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<PrefetchEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PrefetchEvent> {
        self.events.lock().expect("event log poisoned").clone()
    }

    /// Queries of every completed prefetch, in completion order
    pub fn completed_queries(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .map(|event| match event {
                PrefetchEvent::PrefetchComplete { query, .. } => query,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: PrefetchEvent) {
        self.events.lock().expect("event log poisoned").push(event);
    }
}
