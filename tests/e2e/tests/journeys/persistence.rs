//! Journey: what one session learns is still known after a restart.

use std::sync::Arc;
use std::time::Duration;

use prescient_core::{
    Fetcher, FetcherConfig, PatternAnalyzer, PatternStore, DEFAULT_ANALYSIS_WINDOW, PATTERNS_KEY,
};
use prescient_e2e_tests::{MockQueryClient, TestDataFactory, TestPatternDb};

fn config() -> FetcherConfig {
    FetcherConfig {
        prefetch_threshold: 0.25,
        persist_interval: Duration::from_secs(30),
        ..Default::default()
    }
}

fn train(fetcher: &Fetcher, times: usize) {
    let cycle = TestDataFactory::ops_cycle();
    for action in TestDataFactory::navigation_loop(&cycle, times) {
        fetcher.track_action(&action).unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn test_patterns_survive_restart() {
    let mut db = TestPatternDb::new_temp();
    let client = Arc::new(MockQueryClient::new());

    {
        let fetcher = Fetcher::builder(client.clone())
            .config(config())
            .store(db.store())
            .build()
            .unwrap();
        fetcher.start().unwrap();
        train(&fetcher, 5);
        fetcher.shutdown().await.unwrap();
    }
    assert!(db.has_patterns());

    db.reopen();
    let fetcher = Fetcher::builder(client.clone())
        .config(config())
        .store(db.store())
        .build()
        .unwrap();

    let stats = fetcher.stats().unwrap();
    assert_eq!(stats.patterns.sequence_count, 0);
    assert_eq!(stats.patterns.transition_model_size, 4);

    // One action is enough to predict the rest of the routine again
    let cycle = TestDataFactory::ops_cycle();
    let queued = fetcher.track_action(&cycle[1]).unwrap();
    let expected = TestDataFactory::query_for(&cycle[2]);
    assert!(
        queued.iter().any(|p| p.query.as_deref() == Some(expected.as_str())),
        "{queued:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn test_patterns_saved_periodically_while_running() {
    let db = TestPatternDb::new_temp();
    let fetcher = Fetcher::builder(Arc::new(MockQueryClient::new()))
        .config(config())
        .store(db.store())
        .build()
        .unwrap();
    fetcher.start().unwrap();

    train(&fetcher, 2);
    assert!(!db.has_patterns());

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(db.has_patterns());

    let analyzer = PatternAnalyzer::new(db.store(), DEFAULT_ANALYSIS_WINDOW);
    assert_eq!(analyzer.stats().transition_observations, 7);

    fetcher.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_corrupt_patterns_start_from_scratch() {
    let db = TestPatternDb::new_temp();
    db.store()
        .set_item(PATTERNS_KEY, "{ not json")
        .unwrap();

    let fetcher = Fetcher::builder(Arc::new(MockQueryClient::new()))
        .config(config())
        .store(db.store())
        .build()
        .unwrap();

    let stats = fetcher.stats().unwrap();
    assert_eq!(stats.patterns.transition_model_size, 0);
    assert_eq!(stats.patterns.context_model_size, 0);

    // Learning still works and overwrites the bad blob on save
    train(&fetcher, 2);
    assert!(fetcher.save_patterns().unwrap());
    let analyzer = PatternAnalyzer::new(db.store(), DEFAULT_ANALYSIS_WINDOW);
    assert_eq!(analyzer.stats().transition_model_size, 4);
}

#[tokio::test]
async fn test_snapshot_rolls_back_learning() {
    let mut db = TestPatternDb::new_temp();
    let client = Arc::new(MockQueryClient::new());

    let fetcher = Fetcher::builder(client.clone())
        .config(config())
        .store(db.store())
        .build()
        .unwrap();
    train(&fetcher, 2);
    fetcher.save_patterns().unwrap();
    db.take_snapshot();

    // A different routine overwrites what was learned
    for action in TestDataFactory::distinct_metrics(6, "billing") {
        fetcher.track_action(&action).unwrap();
    }
    fetcher.save_patterns().unwrap();
    let drifted = PatternAnalyzer::new(db.store(), DEFAULT_ANALYSIS_WINDOW);
    assert!(drifted.stats().transition_model_size > 4);

    assert!(db.restore_snapshot());
    let restored = PatternAnalyzer::new(db.store(), DEFAULT_ANALYSIS_WINDOW);
    assert_eq!(restored.stats().transition_model_size, 4);
}
