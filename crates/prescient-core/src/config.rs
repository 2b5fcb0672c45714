//! Fetcher configuration
//!
//! Every knob has a default; `from_env` overlays `PRESCIENT_*` environment
//! variables on top.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::{DEFAULT_CACHE_SIZE, DEFAULT_TTL};
use crate::patterns::DEFAULT_ANALYSIS_WINDOW;

/// Invalid configuration value
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("prefetch_threshold must be within [0, 1], got {0}")]
    Threshold(f64),
}

/// Configuration for the prefetch fetcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FetcherConfig {
    /// Maximum prefetches in flight at once
    pub max_concurrent: usize,
    /// Predictions must be strictly more likely than this to be prefetched
    pub prefetch_threshold: f64,
    /// Maximum cached results
    pub cache_size: usize,
    /// Actions kept in the analyzer history
    pub analysis_window: usize,
    /// Worker loop tick
    #[serde(with = "duration_ms")]
    pub batch_delay: Duration,
    /// How long a prefetched result stays valid
    #[serde(with = "duration_ms")]
    pub cache_ttl: Duration,
    /// How long `get_data` waits on an in-flight prefetch
    #[serde(with = "duration_ms")]
    pub wait_timeout: Duration,
    /// How often `get_data` re-checks an in-flight prefetch
    #[serde(with = "duration_ms")]
    pub wait_poll_interval: Duration,
    /// How often learned patterns are saved when they changed
    #[serde(with = "duration_ms")]
    pub persist_interval: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            prefetch_threshold: 0.7,
            cache_size: DEFAULT_CACHE_SIZE,
            analysis_window: DEFAULT_ANALYSIS_WINDOW,
            batch_delay: Duration::from_millis(100),
            cache_ttl: DEFAULT_TTL,
            wait_timeout: Duration::from_millis(5000),
            wait_poll_interval: Duration::from_millis(100),
            persist_interval: Duration::from_secs(30),
        }
    }
}

impl FetcherConfig {
    /// Defaults overlaid with `PRESCIENT_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overlaid with whatever `lookup` returns for each variable
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(v) = parse_var(&lookup, "PRESCIENT_MAX_CONCURRENT") {
            config.max_concurrent = v;
        }
        if let Some(v) = parse_var(&lookup, "PRESCIENT_PREFETCH_THRESHOLD") {
            config.prefetch_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "PRESCIENT_CACHE_SIZE") {
            config.cache_size = v;
        }
        if let Some(v) = parse_var(&lookup, "PRESCIENT_ANALYSIS_WINDOW") {
            config.analysis_window = v;
        }
        if let Some(v) = parse_var(&lookup, "PRESCIENT_BATCH_DELAY_MS") {
            config.batch_delay = Duration::from_millis(v);
        }
        if let Some(v) = parse_var(&lookup, "PRESCIENT_CACHE_TTL_SECS") {
            config.cache_ttl = Duration::from_secs(v);
        }

        config
    }

    /// Reject values the fetcher cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::Zero("max_concurrent"));
        }
        if self.cache_size == 0 {
            return Err(ConfigError::Zero("cache_size"));
        }
        if self.analysis_window == 0 {
            return Err(ConfigError::Zero("analysis_window"));
        }
        if self.batch_delay.is_zero() {
            return Err(ConfigError::Zero("batch_delay"));
        }
        if self.cache_ttl.is_zero() {
            return Err(ConfigError::Zero("cache_ttl"));
        }
        if self.wait_poll_interval.is_zero() {
            return Err(ConfigError::Zero("wait_poll_interval"));
        }
        if self.persist_interval.is_zero() {
            return Err(ConfigError::Zero("persist_interval"));
        }
        if !(0.0..=1.0).contains(&self.prefetch_threshold) {
            return Err(ConfigError::Threshold(self.prefetch_threshold));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring unparseable {}={:?}", name, raw);
            None
        }
    }
}

/// Durations as integer milliseconds
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
