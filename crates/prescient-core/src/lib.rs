//! # Prescient Core
//!
//! Predictive prefetch cache for query-driven clients. Watches what the user
//! does, learns what they tend to do next, and fetches that data before it
//! is asked for:
//!
//! - **Transition Model**: first-order statistics of action -> action sequences
//! - **Context Model**: what usually happens on a given dashboard/widget/view
//! - **Time Model**: what usually happens at this hour and on this weekday
//! - **Priority Queue**: pending prefetches, most likely first
//! - **TTL Cache**: bounded, insertion-ordered store of prefetched results
//! - **Fetcher**: bounded-concurrency worker loop plus a `get_data` facade
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use prescient_core::{Action, Context, Fetcher, GetDataOptions};
//!
//! let fetcher = Fetcher::builder(client).build()?;
//! fetcher.start()?;
//!
//! // Report what the user does
//! let action = Action::new("metric", "cpuPercent")
//!     .with_context(Context::dashboard("ops").with_widget("cpu"));
//! fetcher.track_action(&action)?;
//!
//! // Later requests are served from the warm cache when the guess was right
//! let result = fetcher
//!     .get_data("SELECT average(memoryPercent) FROM Metric SINCE 1 hour ago", GetDataOptions::default())
//!     .await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `bundled-sqlite` (default): SQLite pattern store with a bundled libsqlite3
//! - `sqlite`: SQLite pattern store against the system library

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod cache;
pub mod client;
pub mod config;
pub mod events;
pub mod fetcher;
pub mod queue;
pub mod store;

/// Learned interaction patterns and prediction
pub mod patterns;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Facade
pub use fetcher::{
    ActiveRequest, Fetcher, FetcherBuilder, FetcherStats, GetDataOptions, PrefetchError, Result,
};

// Configuration
pub use config::{ConfigError, FetcherConfig};

// Building blocks
pub use cache::{CacheEntry, PrefetchCache};
pub use queue::{PriorityQueue, QueueItem};

// Patterns
pub use patterns::{
    Action, ActionRecord, AnalyzerStats, Context, ContextModel, PatternAnalyzer, Prediction,
    PredictionSource, QueryTemplates, TimeModel, TransitionModel, DEFAULT_ANALYSIS_WINDOW,
    PATTERNS_KEY,
};

// Ports
pub use client::{QueryClient, QueryError};
pub use events::{BroadcastSink, EventSink, NoopSink, PrefetchEvent, PREFETCH_COMPLETE};
pub use store::{MemoryStore, NoopStore, PatternStore, StoreError};

#[cfg(feature = "sqlite")]
pub use store::SqliteStore;

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version of the persisted pattern format written by this crate
pub const PATTERN_FORMAT_VERSION: u32 = 2;

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        Action, BroadcastSink, Context, EventSink, Fetcher, FetcherConfig, GetDataOptions,
        MemoryStore, PatternStore, PrefetchError, PrefetchEvent, QueryClient, QueryError,
        Result,
    };

    #[cfg(feature = "sqlite")]
    pub use crate::SqliteStore;
}
