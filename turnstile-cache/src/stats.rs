//! Cache counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for cache activity since construction.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub refresh_successes: AtomicU64,
    pub refresh_failures: AtomicU64,
    /// Entries dropped to make room for a new key
    pub evictions: AtomicU64,
    /// Entries dropped because they reached hard expiry
    pub expirations: AtomicU64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Get current snapshot of all counters.
    pub fn snapshot(&self, entries: usize) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            refresh_successes: self.refresh_successes.load(Ordering::Relaxed),
            refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            entries,
        }
    }
}

/// Snapshot of cache counters at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub refresh_successes: u64,
    pub refresh_failures: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub entries: usize,
}

impl CacheStatsSnapshot {
    /// Fraction of lookups served from the cache.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
