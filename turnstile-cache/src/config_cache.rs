//! Bounded TTL cache keyed by service reference.

use std::fmt::Debug;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use turnstile_core::{CacheConfig, ConfigError};

use crate::entry::CacheEntry;
use crate::fetcher::ConfigFetcher;
use crate::refresher;
use crate::stats::{CacheStats, CacheStatsSnapshot};

/// TTL + LRU cache with stale-while-revalidate refresh.
///
/// Cloning is cheap and clones share the same storage. The refresh loop
/// holds only a weak reference, so dropping every clone stops it.
pub struct ConfigCache<K, V> {
    inner: Arc<CacheInner<K, V>>,
}

impl<K, V> Clone for ConfigCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

pub(crate) struct CacheInner<K, V> {
    config: CacheConfig,
    entries: Mutex<LruCache<K, Arc<CacheEntry<V>>>>,
    stats: CacheStats,
}

impl<K, V> ConfigCache<K, V>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Create an empty cache, rejecting invalid configuration.
    pub fn new(config: CacheConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let capacity = NonZeroUsize::new(config.max_size).ok_or_else(|| {
            ConfigError::InvalidValue {
                field: "max_size".to_string(),
                value: config.max_size.to_string(),
                reason: "max_size must be greater than 0".to_string(),
            }
        })?;

        Ok(Self {
            inner: Arc::new(CacheInner {
                config,
                entries: Mutex::new(LruCache::new(capacity)),
                stats: CacheStats::new(),
            }),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Look up a value, marking it most recently used.
    ///
    /// Never blocks on I/O. An expired entry is removed and reported as a miss.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.inner.get(key, Instant::now())
    }

    /// Insert or replace a value with a fresh lifetime.
    pub fn set(&self, key: K, value: V) {
        self.inner.set(key, value, Instant::now());
    }

    /// Remove a key. Returns whether it was present.
    pub fn invalidate(&self, key: &K) -> bool {
        self.inner.entries.lock().pop(key).is_some()
    }

    /// Number of entries currently held, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.inner.stats.snapshot(self.len())
    }

    /// Start the background refresh loop.
    ///
    /// The loop ticks every [`CacheConfig::refresh_tick`], refreshes due
    /// entries through `fetcher` and sweeps expired ones. It exits when
    /// `shutdown_rx` reads `true` (abandoning in-flight fetches) or once
    /// the cache has been dropped.
    pub fn spawn_refresher(
        &self,
        fetcher: Arc<dyn ConfigFetcher<K, V>>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let tick = self.inner.config.refresh_tick();
        tokio::spawn(refresher::refresh_task(
            Arc::downgrade(&self.inner),
            fetcher,
            tick,
            shutdown_rx,
        ))
    }
}

impl<K, V> CacheInner<K, V>
where
    K: Hash + Eq + Clone + Debug,
{
    fn get(&self, key: &K, now: Instant) -> Option<Arc<V>> {
        let mut entries = self.entries.lock();
        let lookup = entries
            .get(key)
            .map(|entry| (entry.is_expired(now), Arc::clone(entry.value())));
        let value = match lookup {
            Some((false, value)) => Some(value),
            Some((true, _)) => {
                entries.pop(key);
                CacheStats::incr(&self.stats.expirations);
                None
            }
            None => None,
        };
        drop(entries);

        match value {
            Some(value) => {
                CacheStats::incr(&self.stats.hits);
                tracing::trace!(key = ?key, "Config cache hit");
                Some(value)
            }
            None => {
                CacheStats::incr(&self.stats.misses);
                tracing::debug!(key = ?key, "Config cache miss");
                None
            }
        }
    }

    fn set(&self, key: K, value: V, now: Instant) {
        let entry = Arc::new(CacheEntry::new(value, now, &self.config));
        let displaced = self.entries.lock().push(key.clone(), entry);

        // push returns the old value for an existing key too
        if let Some((evicted, _)) = displaced {
            if evicted != key {
                CacheStats::incr(&self.stats.evictions);
                tracing::debug!(key = ?evicted, "Config cache evicted least recently used entry");
            }
        }
    }

    /// Entries whose refresh is due, without touching recency.
    pub(crate) fn due_for_refresh(&self, now: Instant) -> Vec<(K, Arc<CacheEntry<V>>)> {
        let max_retries = self.config.num_retry_failed_refresh;
        self.entries
            .lock()
            .iter()
            .filter(|(_, entry)| entry.is_refresh_due(now, max_retries))
            .map(|(key, entry)| (key.clone(), Arc::clone(entry)))
            .collect()
    }

    /// Replace `expected` with a freshly fetched value.
    ///
    /// Has no effect when the key was removed or replaced while the fetch
    /// was in flight. Returns whether the entry was replaced.
    pub(crate) fn refresh_succeeded(
        &self,
        key: &K,
        expected: &Arc<CacheEntry<V>>,
        value: V,
        now: Instant,
    ) -> bool {
        let replaced = {
            let mut entries = self.entries.lock();
            match entries.peek_mut(key) {
                Some(slot) if Arc::ptr_eq(slot, expected) => {
                    *slot = Arc::new(CacheEntry::new(value, now, &self.config));
                    true
                }
                _ => false,
            }
        };

        if replaced {
            CacheStats::incr(&self.stats.refresh_successes);
        }
        replaced
    }

    /// Record a failed refresh of `expected`.
    ///
    /// Returns the new failure count, or `None` when the entry is gone.
    pub(crate) fn refresh_failed(&self, key: &K, expected: &Arc<CacheEntry<V>>) -> Option<u32> {
        let count = {
            let mut entries = self.entries.lock();
            match entries.peek_mut(key) {
                Some(slot) if Arc::ptr_eq(slot, expected) => {
                    let failed = Arc::new(expected.with_failed_refresh());
                    let count = failed.failed_refresh_count();
                    *slot = failed;
                    Some(count)
                }
                _ => None,
            }
        };

        if count.is_some() {
            CacheStats::incr(&self.stats.refresh_failures);
        }
        count
    }

    /// Drop every entry past hard expiry. Returns how many were removed.
    pub(crate) fn evict_expired(&self, now: Instant) -> usize {
        let mut entries = self.entries.lock();
        let expired: Vec<K> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        drop(entries);

        if !expired.is_empty() {
            CacheStats::add(&self.stats.expirations, expired.len() as u64);
        }
        expired.len()
    }

    pub(crate) fn max_retries(&self) -> u32 {
        self.config.num_retry_failed_refresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;

    fn config(max_size: usize) -> CacheConfig {
        CacheConfig::new()
            .with_max_size(max_size)
            .with_ttl(Duration::from_secs(10))
            .with_refresh_interval(Duration::from_secs(4))
            .with_retries(1)
    }

    fn cache(max_size: usize) -> ConfigCache<String, u32> {
        ConfigCache::new(config(max_size)).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let result = ConfigCache::<String, u32>::new(config(0));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));

        let bad_refresh = config(2).with_refresh_interval(Duration::from_secs(10));
        assert!(ConfigCache::<String, u32>::new(bad_refresh).is_err());
    }

    #[test]
    fn test_set_get_invalidate() {
        let cache = cache(4);
        assert!(cache.get(&"a".to_string()).is_none());

        cache.set("a".to_string(), 1);
        assert_eq!(cache.get(&"a".to_string()).as_deref(), Some(&1));

        cache.set("a".to_string(), 2);
        assert_eq!(cache.get(&"a".to_string()).as_deref(), Some(&2));
        assert_eq!(cache.len(), 1);

        assert!(cache.invalidate(&"a".to_string()));
        assert!(!cache.invalidate(&"a".to_string()));
        assert!(cache.get(&"a".to_string()).is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.evictions, 0);
        assert_eq!(stats.entries, 0);
    }

    #[test]
    fn test_lru_evicts_least_recently_set() {
        let cache = cache(2);
        cache.set("A".to_string(), 1);
        cache.set("B".to_string(), 2);
        cache.set("C".to_string(), 3);

        assert!(cache.get(&"A".to_string()).is_none());
        assert!(cache.get(&"B".to_string()).is_some());
        assert!(cache.get(&"C".to_string()).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_get_promotes_entry() {
        let cache = cache(2);
        cache.set("A".to_string(), 1);
        cache.set("B".to_string(), 2);
        assert!(cache.get(&"A".to_string()).is_some());
        cache.set("C".to_string(), 3);

        assert!(cache.get(&"A".to_string()).is_some());
        assert!(cache.get(&"B".to_string()).is_none());
    }

    #[test]
    fn test_single_slot_keeps_newest() {
        let cache = cache(1);
        cache.set("A".to_string(), 1);
        cache.set("B".to_string(), 2);
        assert_eq!(cache.get(&"B".to_string()).as_deref(), Some(&2));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_a_miss() {
        let cache = cache(4);
        cache.set("a".to_string(), 1);

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(cache.get(&"a".to_string()).is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get(&"a".to_string()).is_none());
        assert_eq!(cache.len(), 0);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.expirations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_restarts_lifetime() {
        let cache = cache(4);
        cache.set("a".to_string(), 1);
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.set("a".to_string(), 2);
        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(cache.get(&"a".to_string()).as_deref(), Some(&2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_does_not_resurrect_invalidated_key() {
        let cache = cache(4);
        cache.set("a".to_string(), 1);
        tokio::time::advance(Duration::from_secs(6)).await;

        let due = cache.inner.due_for_refresh(Instant::now());
        assert_eq!(due.len(), 1);
        let (key, expected) = due.into_iter().next().unwrap();

        assert!(cache.invalidate(&key));
        assert!(!cache.inner.refresh_succeeded(&key, &expected, 2, Instant::now()));
        assert!(cache.inner.refresh_failed(&key, &expected).is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_does_not_overwrite_newer_set() {
        let cache = cache(4);
        cache.set("a".to_string(), 1);
        tokio::time::advance(Duration::from_secs(6)).await;

        let (key, expected) = cache.inner.due_for_refresh(Instant::now()).remove(0);
        cache.set("a".to_string(), 5);
        assert!(!cache.inner.refresh_succeeded(&key, &expected, 2, Instant::now()));
        assert_eq!(cache.get(&"a".to_string()).as_deref(), Some(&5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_keeps_recency() {
        let cache = cache(2);
        cache.set("A".to_string(), 1);
        cache.set("B".to_string(), 2);
        tokio::time::advance(Duration::from_secs(6)).await;

        let due = cache.inner.due_for_refresh(Instant::now());
        for (key, expected) in &due {
            if key == "A" {
                assert!(cache.inner.refresh_succeeded(key, expected, 10, Instant::now()));
            }
        }

        // A was refreshed but is still the least recently used entry
        cache.set("C".to_string(), 3);
        assert!(cache.get(&"A".to_string()).is_none());
        assert!(cache.get(&"B".to_string()).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_expired_sweeps_only_expired() {
        let cache = cache(4);
        cache.set("old".to_string(), 1);
        tokio::time::advance(Duration::from_secs(5)).await;
        cache.set("new".to_string(), 2);
        tokio::time::advance(Duration::from_secs(5)).await;

        assert_eq!(cache.inner.evict_expired(Instant::now()), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&"new".to_string()).is_some());
    }

    proptest! {
        #[test]
        fn prop_size_never_exceeds_bound(
            max_size in 1usize..8,
            keys in proptest::collection::vec(0u8..16, 0..64),
        ) {
            let cache = ConfigCache::<u8, u8>::new(config(max_size)).unwrap();
            for key in keys {
                cache.set(key, key);
                prop_assert!(cache.len() <= max_size);
                let got = cache.get(&key);
                prop_assert_eq!(got.as_deref(), Some(&key));
            }
        }

        #[test]
        fn prop_evicts_least_recently_accessed(
            max_size in 1usize..6,
            ops in proptest::collection::vec((any::<bool>(), 0u8..10), 0..64),
        ) {
            let cache = ConfigCache::<u8, u8>::new(config(max_size)).unwrap();
            // Least recently accessed first
            let mut recency: Vec<u8> = Vec::new();

            for (is_read, key) in ops {
                let position = recency.iter().position(|k| *k == key);
                if is_read {
                    let found = cache.get(&key).is_some();
                    prop_assert_eq!(found, position.is_some());
                    if let Some(i) = position {
                        recency.remove(i);
                        recency.push(key);
                    }
                } else {
                    let evicted = match position {
                        Some(i) => {
                            recency.remove(i);
                            None
                        }
                        None if recency.len() == max_size => Some(recency.remove(0)),
                        None => None,
                    };
                    recency.push(key);
                    cache.set(key, key);

                    let entries = cache.inner.entries.lock();
                    if let Some(victim) = evicted {
                        prop_assert!(!entries.contains(&victim));
                    }
                    prop_assert!(entries.contains(&key));
                }

                let entries = cache.inner.entries.lock();
                prop_assert_eq!(entries.len(), recency.len());
                for k in &recency {
                    prop_assert!(entries.contains(k));
                }
            }
        }
    }
}
