//! Journey: a burst of predictions never overloads the backend, and the
//! most likely queries go first.

use std::sync::Arc;
use std::time::Duration;

use prescient_core::{
    Context, Fetcher, FetcherConfig, MemoryStore, Prediction, PredictionSource,
};
use prescient_e2e_tests::{MockQueryClient, RecordingSink};

fn prediction(query: &str, probability: f64) -> Prediction {
    Prediction {
        query: Some(query.to_string()),
        action_key: format!("metric:{query}"),
        probability,
        source: PredictionSource::Transition,
        context: Context::dashboard("ops"),
    }
}

fn fetcher(client: Arc<MockQueryClient>, max_concurrent: usize) -> Fetcher {
    Fetcher::builder(client)
        .config(FetcherConfig {
            max_concurrent,
            ..Default::default()
        })
        .store(Arc::new(MemoryStore::new()))
        .build()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_burst_respects_concurrency_limit() {
    let client = Arc::new(MockQueryClient::with_latency(Duration::from_millis(250)));
    let sink = Arc::new(RecordingSink::new());
    let fetcher = Fetcher::builder(client.clone())
        .config(FetcherConfig {
            max_concurrent: 2,
            ..Default::default()
        })
        .store(Arc::new(MemoryStore::new()))
        .events(sink.clone())
        .build()
        .unwrap();

    for i in 0..8 {
        assert!(fetcher
            .queue_prefetch(&prediction(&format!("Q{i}"), 0.9 - i as f64 * 0.05))
            .unwrap());
    }
    fetcher.start().unwrap();

    for _ in 0..20 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(fetcher.stats().unwrap().active_requests <= 2);
    }
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(client.max_in_flight(), 2);
    assert_eq!(sink.completed_queries().len(), 8);
    let stats = fetcher.stats().unwrap();
    assert_eq!(stats.cache_size, 8);
    assert_eq!(stats.queue_size, 0);
    assert_eq!(stats.active_requests, 0);

    fetcher.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_most_likely_prefetched_first() {
    let client = Arc::new(MockQueryClient::with_latency(Duration::from_millis(10)));
    let fetcher = fetcher(client.clone(), 1);

    fetcher.queue_prefetch(&prediction("low", 0.5)).unwrap();
    fetcher.queue_prefetch(&prediction("high", 0.9)).unwrap();
    fetcher.queue_prefetch(&prediction("mid", 0.7)).unwrap();

    for _ in 0..3 {
        assert_eq!(fetcher.tick().unwrap(), 1);
        // A full slot admits nothing more
        assert_eq!(fetcher.tick().unwrap(), 0);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(client.calls(), vec!["high", "mid", "low"]);
}

#[tokio::test(start_paused = true)]
async fn test_known_queries_not_fetched_twice() {
    let client = Arc::new(MockQueryClient::with_latency(Duration::from_millis(10)));
    let fetcher = fetcher(client.clone(), 3);

    // Two predictions for the same query only fetch once
    assert!(fetcher.queue_prefetch(&prediction("Q", 0.8)).unwrap());
    assert!(fetcher.queue_prefetch(&prediction("Q", 0.6)).unwrap());
    assert_eq!(fetcher.tick().unwrap(), 1);
    assert!(!fetcher.queue_prefetch(&prediction("Q", 0.9)).unwrap());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(fetcher.is_cached("Q").unwrap());
    assert!(!fetcher.queue_prefetch(&prediction("Q", 0.9)).unwrap());
    assert_eq!(fetcher.tick().unwrap(), 0);

    assert_eq!(client.calls_for("Q"), 1);
    assert_eq!(fetcher.stats().unwrap().queue_size, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cache_holds_most_recent_prefetches() {
    let client = Arc::new(MockQueryClient::new());
    let fetcher = Fetcher::builder(client.clone())
        .config(FetcherConfig {
            max_concurrent: 1,
            cache_size: 2,
            ..Default::default()
        })
        .store(Arc::new(MemoryStore::new()))
        .build()
        .unwrap();

    for query in ["q1", "q2", "q3"] {
        fetcher.queue_prefetch(&prediction(query, 0.9)).unwrap();
        fetcher.tick().unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    assert!(!fetcher.is_cached("q1").unwrap());
    assert!(fetcher.is_cached("q2").unwrap());
    assert!(fetcher.is_cached("q3").unwrap());
}
