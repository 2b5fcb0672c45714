//! Prefetch Cache
//!
//! Bounded TTL cache for prefetched query results with hit/miss accounting.
//!
//! Eviction is by insertion order, not access order: entries are only ever
//! read with `peek`, so the underlying LRU list never promotes anything and
//! its least-recently-used slot is always the earliest-inserted survivor.
//! Overwriting an existing key keeps its original position.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::Duration;

use lru::LruCache;
use tokio::time::Instant;
use tracing::debug;

/// Default maximum number of cached results
pub const DEFAULT_CACHE_SIZE: usize = 50;

/// Default time-to-live for cached results (5 minutes)
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// A cached value and when it was stored
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub timestamp: Instant,
}

/// Bounded, TTL-based key/value store
#[derive(Debug)]
pub struct PrefetchCache<V, K = String>
where
    K: Hash + Eq,
{
    entries: LruCache<K, CacheEntry<V>>,
    ttl: Duration,
    hits: u64,
    misses: u64,
}

impl<V: Clone, K: Hash + Eq + Clone> PrefetchCache<V, K> {
    /// Create a cache holding at most `max_size` entries for `ttl` each
    pub fn new(max_size: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            entries: LruCache::new(max_size),
            ttl,
            hits: 0,
            misses: 0,
        }
    }

    fn is_fresh(&self, entry: &CacheEntry<V>) -> bool {
        entry.timestamp.elapsed() < self.ttl
    }

    /// Whether a fresh entry exists. Stale entries are removed.
    pub fn has(&mut self, key: &K) -> bool {
        let fresh = match self.entries.peek(key) {
            Some(entry) => self.is_fresh(entry),
            None => return false,
        };

        if !fresh {
            self.entries.pop(key);
        }
        fresh
    }

    /// Fetch a fresh value, counting the hit or miss
    pub fn get(&mut self, key: &K) -> Option<V> {
        if self.has(key) {
            self.hits += 1;
            self.entries.peek(key).map(|e| e.value.clone())
        } else {
            self.misses += 1;
            None
        }
    }

    /// Store a value, evicting the earliest-inserted entry when full
    pub fn set(&mut self, key: K, value: V) {
        let entry = CacheEntry {
            value,
            timestamp: Instant::now(),
        };

        if let Some(existing) = self.entries.peek_mut(&key) {
            *existing = entry;
            return;
        }

        if self.entries.push(key, entry).is_some() {
            debug!(capacity = self.entries.cap().get(), "Evicted oldest cache entry");
        }
    }

    /// Remove every stale entry, returning how many were dropped
    pub fn purge_expired(&mut self) -> usize {
        let stale: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, entry)| !self.is_fresh(entry))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &stale {
            self.entries.pop(key);
        }
        stale.len()
    }

    /// Fraction of lookups that were hits (0 when nothing was looked up)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Number of stored entries, including ones not yet lazily expired
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Drop all entries and reset the counters
    pub fn clear(&mut self) {
        self.entries.clear();
        self.hits = 0;
        self.misses = 0;
    }
}
