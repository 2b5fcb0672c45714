//! Prefetch events
//!
//! Completed prefetches are published through an [`EventSink`]. Delivery is
//! fire-and-forget: nobody is guaranteed to be listening.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

/// Topic name of a completed prefetch
pub const PREFETCH_COMPLETE: &str = "prefetch:complete";

/// Default capacity of the broadcast channel
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Something the fetcher tells the host about
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum PrefetchEvent {
    /// A predicted query finished and its result is now cached
    PrefetchComplete {
        query: String,
        result: Value,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

impl PrefetchEvent {
    /// Topic the host should dispatch this event under
    pub fn topic(&self) -> &'static str {
        match self {
            Self::PrefetchComplete { .. } => PREFETCH_COMPLETE,
        }
    }

    /// Serialize to a JSON string for transmission
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Publish/subscribe port wired to the host's event system
pub trait EventSink: Send + Sync {
    fn emit(&self, event: PrefetchEvent);
}

/// Sink that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: PrefetchEvent) {}
}

/// Sink backed by a tokio broadcast channel
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<PrefetchEvent>,
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PrefetchEvent> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn emit(&self, event: PrefetchEvent) {
        // Err only means there are no subscribers right now
        let _ = self.tx.send(event);
    }
}
