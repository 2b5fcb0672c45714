//! # Prefetch Fetcher
//!
//! Orchestrates the pattern analyzer, the priority queue and the cache:
//!
//! 1. **Track**: every user action is recorded and turned into predictions
//! 2. **Queue**: predictions above the threshold become prefetch requests
//! 3. **Drain**: a worker loop starts up to `max_concurrent` fetches per tick
//! 4. **Serve**: `get_data` answers from the cache, waits on an in-flight
//!    prefetch, or falls through to a direct fetch
//!
//! Queue, cache and in-flight map share one lock that is never held across
//! an `.await`, so every check-then-insert on them is atomic.
//!
//! ## Example
//!
//! ```rust,ignore
//! let fetcher = Fetcher::builder(client)
//!     .store(Arc::new(SqliteStore::new(None)?))
//!     .events(Arc::new(sink.clone()))
//!     .build()?;
//! fetcher.start()?;
//!
//! fetcher.track_action(&Action::new("metric", "cpuPercent"))?;
//! let rows = fetcher.get_data(query, GetDataOptions::default()).await?;
//!
//! fetcher.shutdown().await?;
//! ```

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::cache::PrefetchCache;
use crate::client::{QueryClient, QueryError};
use crate::config::{ConfigError, FetcherConfig};
use crate::events::{EventSink, NoopSink, PrefetchEvent};
use crate::patterns::{
    Action, AnalyzerStats, PatternAnalyzer, Prediction, QueryTemplates, PATTERNS_KEY,
};
use crate::queue::{PriorityQueue, QueueItem};
use crate::store::{NoopStore, PatternStore};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Errors surfaced by the fetcher
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum PrefetchError {
    /// A direct fetch failed
    #[error(transparent)]
    Query(#[from] QueryError),
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// Lock poisoned during concurrent access
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
    /// `start` called twice
    #[error("Background tasks already running")]
    AlreadyRunning,
    /// Called outside a tokio runtime
    #[error("No tokio runtime available")]
    NoRuntime,
}

/// Result type for fetcher operations
pub type Result<T> = std::result::Result<T, PrefetchError>;

// ============================================================================
// TYPES
// ============================================================================

/// A prefetch currently in flight
#[derive(Debug, Clone)]
pub struct ActiveRequest {
    pub start_time: Instant,
    pub context: crate::patterns::Context,
}

/// Options for [`Fetcher::get_data`]
#[derive(Debug, Clone, Default)]
pub struct GetDataOptions {
    /// Skip the initial cache lookup
    pub fresh: bool,
    /// Variables forwarded to a direct fetch
    pub variables: Option<Value>,
}

impl GetDataOptions {
    pub fn fresh() -> Self {
        Self {
            fresh: true,
            ..Default::default()
        }
    }
}

/// Snapshot of the fetcher's state
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetcherStats {
    pub cache_size: usize,
    pub cache_hit_rate: f64,
    pub queue_size: usize,
    pub active_requests: usize,
    pub patterns: AnalyzerStats,
}

/// Everything guarded by the scheduler lock
struct SchedulerState {
    queue: PriorityQueue,
    cache: PrefetchCache<Value>,
    active: HashMap<String, ActiveRequest>,
}

impl SchedulerState {
    fn is_known(&mut self, query: &str) -> bool {
        self.active.contains_key(query) || self.cache.has(&query.to_string())
    }

    fn mark_active(&mut self, item: &QueueItem) {
        self.active.insert(
            item.query.clone(),
            ActiveRequest {
                start_time: Instant::now(),
                context: item.context.clone(),
            },
        );
    }
}

struct Inner {
    config: FetcherConfig,
    client: Arc<dyn QueryClient>,
    events: Arc<dyn EventSink>,
    analyzer: Mutex<PatternAnalyzer>,
    state: Mutex<SchedulerState>,
}

struct BackgroundTasks {
    shutdown_tx: watch::Sender<bool>,
    worker: JoinHandle<()>,
    persister: JoinHandle<()>,
}

// ============================================================================
// BUILDER
// ============================================================================

/// Builder for [`Fetcher`]
pub struct FetcherBuilder {
    client: Arc<dyn QueryClient>,
    config: FetcherConfig,
    store: Arc<dyn PatternStore>,
    events: Arc<dyn EventSink>,
    templates: QueryTemplates,
}

impl FetcherBuilder {
    pub fn config(mut self, config: FetcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Where learned patterns are loaded from and saved to
    pub fn store(mut self, store: Arc<dyn PatternStore>) -> Self {
        self.store = store;
        self
    }

    /// Where `prefetch:complete` events go
    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn templates(mut self, templates: QueryTemplates) -> Self {
        self.templates = templates;
        self
    }

    /// Validate the configuration and load stored patterns
    pub fn build(self) -> Result<Fetcher> {
        self.config.validate()?;

        let cache_size =
            NonZeroUsize::new(self.config.cache_size).ok_or(ConfigError::Zero("cache_size"))?;
        let analyzer =
            PatternAnalyzer::with_templates(self.store, self.config.analysis_window, self.templates);

        let inner = Inner {
            state: Mutex::new(SchedulerState {
                queue: PriorityQueue::new(),
                cache: PrefetchCache::new(cache_size, self.config.cache_ttl),
                active: HashMap::new(),
            }),
            analyzer: Mutex::new(analyzer),
            client: self.client,
            events: self.events,
            config: self.config,
        };

        Ok(Fetcher {
            inner: Arc::new(inner),
            tasks: Mutex::new(None),
        })
    }
}

// ============================================================================
// FETCHER
// ============================================================================

/// Predictive prefetching facade
pub struct Fetcher {
    inner: Arc<Inner>,
    tasks: Mutex<Option<BackgroundTasks>>,
}

impl Fetcher {
    /// Start building a fetcher around `client`
    ///
    /// Defaults: [`FetcherConfig::default`], no persistence, no events.
    pub fn builder(client: Arc<dyn QueryClient>) -> FetcherBuilder {
        FetcherBuilder {
            client,
            config: FetcherConfig::default(),
            store: Arc::new(NoopStore),
            events: Arc::new(NoopSink),
            templates: QueryTemplates::default(),
        }
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.inner.config
    }

    // ------------------------------------------------------------------------
    // Tracking
    // ------------------------------------------------------------------------

    /// Record a user action and queue prefetches for likely follow-ups
    ///
    /// Returns the predictions that were queued.
    pub fn track_action(&self, action: &Action) -> Result<Vec<Prediction>> {
        let predictions = {
            let mut analyzer = self.inner.analyzer()?;
            analyzer.record_action(action);
            analyzer.predict(&action.context)
        };

        let threshold = self.inner.config.prefetch_threshold;
        let mut queued = Vec::new();
        for prediction in predictions.into_iter().filter(|p| p.probability > threshold) {
            if self.queue_prefetch(&prediction)? {
                queued.push(prediction);
            }
        }

        self.inner.analyzer()?.learn(action);

        debug!(action = %action.key(), queued = queued.len(), "Tracked action");
        Ok(queued)
    }

    /// Queue a prediction unless its query is already cached or in flight
    ///
    /// Returns whether it was queued.
    pub fn queue_prefetch(&self, prediction: &Prediction) -> Result<bool> {
        let Some(query) = prediction.query.as_deref() else {
            return Ok(false);
        };

        let mut state = self.inner.state()?;
        if state.is_known(query) {
            debug!(query, "Already cached or in flight");
            return Ok(false);
        }

        state.queue.enqueue(QueueItem::new(
            query,
            prediction.probability,
            prediction.context.clone(),
        ));
        Ok(true)
    }

    // ------------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------------

    /// Run one worker-loop step: start as many queued prefetches as there
    /// are free slots
    ///
    /// Returns how many were started. Must be called within a tokio runtime.
    pub fn tick(&self) -> Result<usize> {
        Inner::tick(&self.inner)
    }

    /// Prefetch one item now, bypassing the queue
    ///
    /// Admission matches the worker loop: a query already cached or in
    /// flight is skipped, and so is anything arriving while every slot is
    /// taken. Returns whether the prefetch ran.
    pub async fn execute_prefetch(&self, item: QueueItem) -> Result<bool> {
        {
            let mut state = self.inner.state()?;
            if state.is_known(&item.query) {
                debug!(query = %item.query, "Prefetch already cached or in flight");
                return Ok(false);
            }
            if state.active.len() >= self.inner.config.max_concurrent {
                debug!(query = %item.query, "No free prefetch slot");
                return Ok(false);
            }
            state.mark_active(&item);
        }

        Inner::run_prefetch(self.inner.clone(), item).await;
        Ok(true)
    }

    // ------------------------------------------------------------------------
    // Serving
    // ------------------------------------------------------------------------

    /// Get the result of `query`
    ///
    /// Served from the cache when possible (unless `options.fresh`), then
    /// from an in-flight prefetch if one finishes within the wait timeout,
    /// otherwise fetched directly. Direct fetches are not cached.
    pub async fn get_data(&self, query: &str, options: GetDataOptions) -> Result<Value> {
        let in_flight = {
            let mut state = self.inner.state()?;
            if !options.fresh {
                if let Some(value) = state.cache.get(&query.to_string()) {
                    debug!(query, "Served from cache");
                    return Ok(value);
                }
            }
            state.active.contains_key(query)
        };

        if in_flight {
            if self.wait_for_prefetch(query).await? {
                let completed = self.inner.state()?.cache.get(&query.to_string());
                if let Some(value) = completed {
                    debug!(query, "Served from completed prefetch");
                    return Ok(value);
                }
            } else {
                debug!(query, "Timed out waiting for prefetch");
            }
        }

        debug!(query, "Direct fetch");
        let value = self
            .inner
            .client
            .query(query, options.variables.as_ref())
            .await?;
        Ok(value)
    }

    /// Poll until `query` is no longer in flight. False on timeout.
    async fn wait_for_prefetch(&self, query: &str) -> Result<bool> {
        let deadline = Instant::now() + self.inner.config.wait_timeout;
        loop {
            tokio::time::sleep(self.inner.config.wait_poll_interval).await;
            let still_active = self.inner.state()?.active.contains_key(query);
            if !still_active {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Spawn the worker loop and the persistence loop
    pub fn start(&self) -> Result<()> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| PrefetchError::NoRuntime)?;
        let mut tasks = self.tasks()?;
        if tasks.is_some() {
            return Err(PrefetchError::AlreadyRunning);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = handle.spawn(Inner::worker_loop(self.inner.clone(), shutdown_rx.clone()));
        let persister = handle.spawn(Inner::persist_loop(self.inner.clone(), shutdown_rx));

        *tasks = Some(BackgroundTasks {
            shutdown_tx,
            worker,
            persister,
        });

        info!(
            max_concurrent = self.inner.config.max_concurrent,
            threshold = self.inner.config.prefetch_threshold,
            batch_delay_ms = self.inner.config.batch_delay.as_millis() as u64,
            "Prefetch fetcher started"
        );
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.tasks.lock().map(|t| t.is_some()).unwrap_or(false)
    }

    /// Stop the background loops and save learned patterns
    ///
    /// In-flight prefetches are left to finish on their own.
    pub async fn shutdown(&self) -> Result<()> {
        let tasks = self.tasks()?.take();

        if let Some(tasks) = tasks {
            let _ = tasks.shutdown_tx.send(true);
            if let Err(e) = tasks.worker.await {
                warn!("Worker loop ended abnormally: {}", e);
            }
            if let Err(e) = tasks.persister.await {
                warn!("Persistence loop ended abnormally: {}", e);
            }
        }

        Inner::persist(&self.inner).await?;
        info!("Prefetch fetcher stopped");
        Ok(())
    }

    /// Save learned patterns now. Returns whether the save succeeded.
    ///
    /// The store write happens on the calling thread.
    pub fn save_patterns(&self) -> Result<bool> {
        Ok(self.inner.analyzer()?.save_patterns())
    }

    // ------------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------------

    pub fn stats(&self) -> Result<FetcherStats> {
        let patterns = self.inner.analyzer()?.stats();
        let state = self.inner.state()?;
        Ok(FetcherStats {
            cache_size: state.cache.len(),
            cache_hit_rate: state.cache.hit_rate(),
            queue_size: state.queue.len(),
            active_requests: state.active.len(),
            patterns,
        })
    }

    /// Whether a fresh result for `query` is cached (no hit/miss counted)
    pub fn is_cached(&self, query: &str) -> Result<bool> {
        Ok(self.inner.state()?.cache.has(&query.to_string()))
    }

    /// Whether a prefetch for `query` is in flight
    pub fn is_active(&self, query: &str) -> Result<bool> {
        Ok(self.inner.state()?.active.contains_key(query))
    }

    /// Current predictions for `context`, without recording anything
    pub fn predict(&self, context: &crate::patterns::Context) -> Result<Vec<Prediction>> {
        Ok(self.inner.analyzer()?.predict(context))
    }

    /// Drop every cached result and pending prefetch
    pub fn clear(&self) -> Result<()> {
        let mut state = self.inner.state()?;
        state.cache.clear();
        state.queue.clear();
        Ok(())
    }

    fn tasks(&self) -> Result<MutexGuard<'_, Option<BackgroundTasks>>> {
        self.tasks
            .lock()
            .map_err(|_| PrefetchError::LockPoisoned("Task lock poisoned".into()))
    }
}

// ============================================================================
// INNER
// ============================================================================

impl Inner {
    fn state(&self) -> Result<MutexGuard<'_, SchedulerState>> {
        self.state
            .lock()
            .map_err(|_| PrefetchError::LockPoisoned("Scheduler state lock poisoned".into()))
    }

    fn analyzer(&self) -> Result<MutexGuard<'_, PatternAnalyzer>> {
        self.analyzer
            .lock()
            .map_err(|_| PrefetchError::LockPoisoned("Analyzer lock poisoned".into()))
    }

    fn tick(this: &Arc<Self>) -> Result<usize> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| PrefetchError::NoRuntime)?;

        let started: Vec<QueueItem> = {
            let mut state = this.state()?;
            let purged = state.cache.purge_expired();
            if purged > 0 {
                debug!(purged, "Dropped expired cache entries");
            }

            let slots = this.config.max_concurrent.saturating_sub(state.active.len());
            let mut started = Vec::with_capacity(slots);

            while started.len() < slots {
                let Some(item) = state.queue.dequeue() else {
                    break;
                };
                if state.is_known(&item.query) {
                    debug!(query = %item.query, "Dropping stale queue entry");
                    continue;
                }
                state.mark_active(&item);
                started.push(item);
            }
            started
        };

        let count = started.len();
        for item in started {
            handle.spawn(Self::run_prefetch(this.clone(), item));
        }
        Ok(count)
    }

    /// Fetch an item already marked active, then cache it and clear the mark
    async fn run_prefetch(self: Arc<Self>, item: QueueItem) {
        let began = Instant::now();
        let outcome = self.client.query(&item.query, None).await;
        let duration_ms = began.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(result) => {
                match self.state() {
                    Ok(mut state) => {
                        state.cache.set(item.query.clone(), result.clone());
                        state.active.remove(&item.query);
                    }
                    Err(e) => warn!(query = %item.query, "Could not cache prefetch: {}", e),
                }
                result
            }
            Err(e) => {
                warn!(query = %item.query, priority = item.priority, "Prefetch failed: {}", e);
                match self.state() {
                    Ok(mut state) => {
                        state.active.remove(&item.query);
                    }
                    Err(e) => warn!(query = %item.query, "Could not clear prefetch: {}", e),
                }
                return;
            }
        };

        debug!(query = %item.query, duration_ms, "Prefetch complete");
        self.events.emit(PrefetchEvent::PrefetchComplete {
            query: item.query,
            result,
            duration_ms,
            timestamp: Utc::now(),
        });
    }

    async fn worker_loop(this: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(this.config.batch_delay);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = Self::tick(&this) {
                        warn!("Worker tick failed: {}", e);
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        debug!("Worker loop stopped");
    }

    async fn persist_loop(this: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let period = this.config.persist_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = Self::persist(&this).await {
                        warn!("Periodic pattern save skipped: {}", e);
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        debug!("Persistence loop stopped");
    }

    /// Save the models if they changed since the last save
    ///
    /// Serializes under the analyzer lock and writes on the blocking pool
    /// with the lock released. Store failures are logged, not returned.
    async fn persist(this: &Arc<Self>) -> Result<()> {
        let pending = {
            let analyzer = this.analyzer()?;
            if !analyzer.is_dirty() {
                return Ok(());
            }
            analyzer
                .export_patterns()
                .map(|raw| (raw, analyzer.revision(), analyzer.store()))
        };
        let Some((raw, revision, store)) = pending else {
            return Ok(());
        };

        let bytes = raw.len();
        match tokio::task::spawn_blocking(move || store.set_item(PATTERNS_KEY, &raw)).await {
            Ok(Ok(())) => {
                this.analyzer()?.mark_saved(revision);
                debug!(bytes, revision, "Saved patterns");
            }
            Ok(Err(e)) => warn!("Failed to save patterns: {}", e),
            Err(e) => warn!("Pattern save task failed: {}", e),
        }
        Ok(())
    }
}
