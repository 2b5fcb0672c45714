//! Journey: backend and storage failures degrade prefetching without
//! breaking the caller.

use std::sync::Arc;
use std::time::Duration;

use prescient_core::{
    Context, Fetcher, FetcherConfig, GetDataOptions, MemoryStore, PatternStore, Prediction,
    PredictionSource, PrefetchError, QueryError, StoreError,
};
use prescient_e2e_tests::{MockQueryClient, RecordingSink, TestDataFactory};

/// Store whose writes always fail
struct ReadOnlyStore;

impl PatternStore for ReadOnlyStore {
    fn get_item(&self, _key: &str) -> prescient_core::store::Result<Option<String>> {
        Ok(None)
    }

    fn set_item(&self, _key: &str, _value: &str) -> prescient_core::store::Result<()> {
        Err(StoreError::Database("attempt to write a readonly database".into()))
    }

    fn remove_item(&self, _key: &str) -> prescient_core::store::Result<()> {
        Err(StoreError::Database("attempt to write a readonly database".into()))
    }
}

fn prediction(query: &str) -> Prediction {
    Prediction {
        query: Some(query.to_string()),
        action_key: format!("event:{query}"),
        probability: 0.9,
        source: PredictionSource::Context,
        context: Context::dashboard("ops"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_failed_prefetch_leaves_no_trace() {
    let client = Arc::new(MockQueryClient::with_latency(Duration::from_millis(10)));
    let sink = Arc::new(RecordingSink::new());
    client.fail("broken");

    let fetcher = Fetcher::builder(client.clone())
        .store(Arc::new(MemoryStore::new()))
        .events(sink.clone())
        .build()
        .unwrap();

    fetcher.queue_prefetch(&prediction("broken")).unwrap();
    fetcher.queue_prefetch(&prediction("fine")).unwrap();
    assert_eq!(fetcher.tick().unwrap(), 2);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(!fetcher.is_active("broken").unwrap());
    assert!(!fetcher.is_cached("broken").unwrap());
    assert!(fetcher.is_cached("fine").unwrap());
    assert_eq!(sink.completed_queries(), vec!["fine".to_string()]);

    // Not cached, so a later prediction may try again
    assert!(fetcher.queue_prefetch(&prediction("broken")).unwrap());
}

#[tokio::test]
async fn test_direct_fetch_error_reaches_caller() {
    let client = Arc::new(MockQueryClient::new());
    client.fail("broken");
    let fetcher = Fetcher::builder(client.clone())
        .store(Arc::new(MemoryStore::new()))
        .build()
        .unwrap();

    let err = fetcher
        .get_data("broken", GetDataOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PrefetchError::Query(QueryError::Failed(ref msg)) if msg.contains("broken")
    ));

    client.heal("broken");
    let value = fetcher
        .get_data("broken", GetDataOptions::default())
        .await
        .unwrap();
    assert_eq!(value["query"], "broken");
}

#[tokio::test(start_paused = true)]
async fn test_waiting_request_falls_back_when_prefetch_fails() {
    let client = Arc::new(MockQueryClient::with_latency(Duration::from_millis(300)));
    client.fail("flaky");
    let fetcher = Fetcher::builder(client.clone())
        .store(Arc::new(MemoryStore::new()))
        .build()
        .unwrap();

    fetcher.queue_prefetch(&prediction("flaky")).unwrap();
    fetcher.tick().unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(fetcher.is_active("flaky").unwrap());

    // The prefetch fails while we wait; the direct fetch then fails too
    let err = fetcher
        .get_data("flaky", GetDataOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PrefetchError::Query(_)));
    assert_eq!(client.calls_for("flaky"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unwritable_store_does_not_stop_prefetching() {
    let client = Arc::new(MockQueryClient::new());
    let fetcher = Fetcher::builder(client.clone())
        .config(FetcherConfig {
            prefetch_threshold: 0.25,
            persist_interval: Duration::from_secs(1),
            ..Default::default()
        })
        .store(Arc::new(ReadOnlyStore))
        .build()
        .unwrap();
    fetcher.start().unwrap();

    let cycle = TestDataFactory::ops_cycle();
    for action in TestDataFactory::navigation_loop(&cycle, 3) {
        fetcher.track_action(&action).unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    assert!(!fetcher.save_patterns().unwrap());
    assert!(fetcher.is_cached(&TestDataFactory::query_for(&cycle[0])).unwrap());

    // Shutdown still succeeds; the failed save is only logged
    fetcher.shutdown().await.unwrap();
}

#[test]
fn test_invalid_config_rejected_at_build() {
    let result = Fetcher::builder(Arc::new(MockQueryClient::new()))
        .config(FetcherConfig {
            prefetch_threshold: 2.0,
            ..Default::default()
        })
        .build();
    assert!(matches!(result, Err(PrefetchError::Config(_))));
}

#[test]
fn test_tick_outside_runtime() {
    let fetcher = Fetcher::builder(Arc::new(MockQueryClient::new()))
        .store(Arc::new(MemoryStore::new()))
        .build()
        .unwrap();
    assert!(matches!(fetcher.tick(), Err(PrefetchError::NoRuntime)));
    assert!(matches!(fetcher.start(), Err(PrefetchError::NoRuntime)));
}
