//! Cache entry timestamps and refresh bookkeeping.

use std::sync::Arc;

use tokio::time::Instant;
use turnstile_core::CacheConfig;

/// A cached value with its lifetime.
///
/// Entries are immutable; refreshes and failures replace the whole entry.
#[derive(Debug)]
pub struct CacheEntry<V> {
    value: Arc<V>,
    fetched_at: Instant,
    expires_at: Instant,
    refresh_at: Instant,
    failed_refresh_count: u32,
}

impl<V> CacheEntry<V> {
    /// Create an entry fetched at `now`.
    pub fn new(value: V, now: Instant, config: &CacheConfig) -> Self {
        let expires_at = now + config.ttl;
        Self {
            value: Arc::new(value),
            fetched_at: now,
            expires_at,
            refresh_at: expires_at - config.refresh_interval,
            failed_refresh_count: 0,
        }
    }

    pub fn value(&self) -> &Arc<V> {
        &self.value
    }

    pub fn fetched_at(&self) -> Instant {
        self.fetched_at
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    pub fn refresh_at(&self) -> Instant {
        self.refresh_at
    }

    pub fn failed_refresh_count(&self) -> u32 {
        self.failed_refresh_count
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    /// Whether the refresh loop should fetch this entry again.
    pub fn is_refresh_due(&self, now: Instant, max_retries: u32) -> bool {
        !self.is_expired(now) && now >= self.refresh_at && self.failed_refresh_count <= max_retries
    }

    /// Same value and deadlines with one more failed refresh recorded.
    pub(crate) fn with_failed_refresh(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            fetched_at: self.fetched_at,
            expires_at: self.expires_at,
            refresh_at: self.refresh_at,
            failed_refresh_count: self.failed_refresh_count.saturating_add(1),
        }
    }
}
