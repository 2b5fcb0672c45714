//! Action log replay
//!
//! Feeds a recorded session through a [`Fetcher`] the way a dashboard
//! would: request the data an action needs, report the action, pause, and
//! repeat. Requests that find their result already cached are the ones
//! the predictor got right.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use prescient_core::{
    Action, BroadcastSink, EventSink, Fetcher, FetcherStats, GetDataOptions, PatternStore,
    QueryTemplates,
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::simulated::SimulatedClient;

/// Parse a JSON-lines action log
///
/// Blank lines and lines starting with `#` are skipped.
pub fn parse_log(input: &str) -> anyhow::Result<Vec<Action>> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(i, line)| {
            serde_json::from_str::<Action>(line)
                .with_context(|| format!("line {}: not a valid action", i + 1))
        })
        .collect()
}

/// Read and parse an action log from disk
pub fn read_log(path: &Path) -> anyhow::Result<Vec<Action>> {
    let input = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_log(&input)
}

/// Knobs for a replay run
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    /// Pause between consecutive actions
    pub pace: Duration,
    /// Upper bound on waiting for outstanding prefetches at the end
    pub drain_timeout: Duration,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            pace: Duration::from_millis(250),
            drain_timeout: Duration::from_secs(10),
        }
    }
}

/// Outcome of a replay
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    pub actions: usize,
    /// Actions whose data could be requested (a template matched)
    pub requests: usize,
    /// Requests answered from an already cached prefetch
    pub warm_hits: usize,
    /// Requests that caught a prefetch still in flight
    pub in_flight_hits: usize,
    pub request_errors: usize,
    pub predictions_queued: usize,
    pub prefetches_completed: u64,
    pub client_calls: u64,
    pub client_failures: u64,
    pub patterns_saved: bool,
    pub final_stats: FetcherStats,
}

impl ReplayReport {
    /// Share of requests served by a prefetch (cached or in flight)
    pub fn prediction_accuracy(&self) -> f64 {
        if self.requests == 0 {
            return 0.0;
        }
        (self.warm_hits + self.in_flight_hits) as f64 / self.requests as f64
    }
}

/// Replay `actions` through a fresh fetcher
pub async fn run(
    actions: &[Action],
    client: Arc<SimulatedClient>,
    fetcher_config: prescient_core::FetcherConfig,
    store: Arc<dyn PatternStore>,
    options: ReplayOptions,
) -> anyhow::Result<ReplayReport> {
    let templates = QueryTemplates::default();
    let sink = Arc::new(BroadcastSink::new(actions.len().max(256)));
    let mut completions = sink.subscribe();

    let counter = tokio::spawn(async move {
        let mut completed = 0u64;
        loop {
            match completions.recv().await {
                Ok(_) => completed += 1,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => completed += n,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
        completed
    });

    let fetcher = Fetcher::builder(client.clone())
        .config(fetcher_config)
        .store(store)
        .events(sink.clone() as Arc<dyn EventSink>)
        .templates(templates.clone())
        .build()?;
    fetcher.start()?;

    let mut requests = 0;
    let mut warm_hits = 0;
    let mut in_flight_hits = 0;
    let mut request_errors = 0;
    let mut predictions_queued = 0;

    for action in actions {
        if let Some(query) = templates.reconstruct(&action.key(), Some(&action.context)) {
            requests += 1;
            if fetcher.is_cached(&query)? {
                warm_hits += 1;
            } else if fetcher.is_active(&query)? {
                in_flight_hits += 1;
            }

            if let Err(e) = fetcher.get_data(&query, GetDataOptions::default()).await {
                warn!(query = %query, error = %e, "Request failed during replay");
                request_errors += 1;
            }
        } else {
            debug!(action = %action.key(), "No template for action, nothing to request");
        }

        let queued = fetcher.track_action(action)?;
        predictions_queued += queued.len();

        if !options.pace.is_zero() {
            tokio::time::sleep(options.pace).await;
        }
    }

    drain(&fetcher, options.drain_timeout).await?;

    let final_stats = fetcher.stats()?;
    let patterns_saved = fetcher.save_patterns()?;
    fetcher.shutdown().await?;

    drop(fetcher);
    drop(sink);
    let prefetches_completed = counter.await.unwrap_or_default();

    Ok(ReplayReport {
        actions: actions.len(),
        requests,
        warm_hits,
        in_flight_hits,
        request_errors,
        predictions_queued,
        prefetches_completed,
        client_calls: client.calls(),
        client_failures: client.failures(),
        patterns_saved,
        final_stats,
    })
}

/// Wait until nothing is queued or in flight, or the timeout passes
async fn drain(fetcher: &Fetcher, timeout: Duration) -> anyhow::Result<()> {
    let poll = fetcher.config().batch_delay;
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        let stats = fetcher.stats()?;
        if stats.queue_size == 0 && stats.active_requests == 0 {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            warn!(
                queued = stats.queue_size,
                active = stats.active_requests,
                "Replay finished with prefetches outstanding"
            );
            return Ok(());
        }
        tokio::time::sleep(poll).await;
    }
}
