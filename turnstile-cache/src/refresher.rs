//! Background refresh loop.
//!
//! One task per cache. Each tick it sweeps expired entries, then re-fetches
//! every entry inside its refresh window whose retry budget is not spent.
//! Fetches in a pass run concurrently; a shutdown signal abandons them.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::{stream, StreamExt};
use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::config_cache::CacheInner;
use crate::fetcher::ConfigFetcher;

const MAX_CONCURRENT_REFRESHES: usize = 16;

pub(crate) async fn refresh_task<K, V>(
    cache: Weak<CacheInner<K, V>>,
    fetcher: Arc<dyn ConfigFetcher<K, V>>,
    tick: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    let mut ticker = interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(tick_ms = tick.as_millis() as u64, "Config cache refresher started");

    loop {
        let stopped = tokio::select! {
            biased;
            _ = stop_requested(&mut shutdown_rx) => true,
            _ = ticker.tick() => false,
        };
        if stopped {
            tracing::info!("Config cache refresher shutting down");
            break;
        }

        let Some(inner) = cache.upgrade() else {
            tracing::debug!("Config cache dropped, refresher exiting");
            break;
        };

        let stopped = tokio::select! {
            biased;
            _ = stop_requested(&mut shutdown_rx) => true,
            _ = refresh_pass(&inner, fetcher.as_ref()) => false,
        };
        drop(inner);

        if stopped {
            tracing::info!("Config cache refresher shutting down during refresh pass");
            break;
        }
    }
}

/// Resolves once the stop flag is set or the sender is gone.
async fn stop_requested(shutdown_rx: &mut watch::Receiver<bool>) {
    let _ = shutdown_rx.wait_for(|stop| *stop).await;
}

async fn refresh_pass<K, V>(inner: &CacheInner<K, V>, fetcher: &dyn ConfigFetcher<K, V>)
where
    K: Hash + Eq + Clone + Debug + Send + Sync,
    V: Send + Sync,
{
    let now = Instant::now();
    let expired = inner.evict_expired(now);
    if expired > 0 {
        tracing::debug!(expired, "Config cache swept expired entries");
    }

    let due = inner.due_for_refresh(now);
    if due.is_empty() {
        return;
    }
    tracing::debug!(due = due.len(), "Config cache refresh pass started");

    let max_retries = inner.max_retries();
    stream::iter(due)
        .map(|(key, expected)| async move {
            let result = fetcher.fetch(&key).await;
            (key, expected, result)
        })
        .buffer_unordered(MAX_CONCURRENT_REFRESHES)
        .for_each(|(key, expected, result)| {
            match result {
                Ok(value) => {
                    if inner.refresh_succeeded(&key, &expected, value, Instant::now()) {
                        tracing::debug!(key = ?key, "Config cache entry refreshed");
                    } else {
                        tracing::debug!(key = ?key, "Config cache entry changed during refresh, result discarded");
                    }
                }
                Err(e) => match inner.refresh_failed(&key, &expected) {
                    Some(failures) if failures > max_retries => {
                        tracing::warn!(
                            key = ?key,
                            error = %e,
                            failures,
                            "Config cache refresh failed, giving up until expiry"
                        );
                    }
                    Some(failures) => {
                        tracing::warn!(
                            key = ?key,
                            error = %e,
                            failures,
                            "Config cache refresh failed, will retry"
                        );
                    }
                    None => {
                        tracing::debug!(key = ?key, error = %e, "Config cache refresh failed for removed entry");
                    }
                },
            }
            futures_util::future::ready(())
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConfigCache;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
    use turnstile_core::{CacheConfig, FetchError};

    /// Returns an incrementing version per fetch, or fails when told to.
    struct VersionFetcher {
        calls: AtomicU32,
        fail: bool,
        delay: Duration,
        next: AtomicU64,
    }

    impl VersionFetcher {
        fn new() -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail: false,
                delay: Duration::ZERO,
                next: AtomicU64::new(100),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new()
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::new()
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ConfigFetcher<String, u64> for VersionFetcher {
        async fn fetch(&self, key: &String) -> Result<u64, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(FetchError::Transport {
                    endpoint: key.clone(),
                    reason: "connection refused".to_string(),
                    timed_out: false,
                });
            }
            Ok(self.next.fetch_add(1, Ordering::SeqCst))
        }
    }

    /// ttl 10s, refresh window 6s, one retry: tick every 2s, due at 4s.
    fn cache() -> ConfigCache<String, u64> {
        ConfigCache::new(
            CacheConfig::new()
                .with_max_size(8)
                .with_ttl(Duration::from_secs(10))
                .with_refresh_interval(Duration::from_secs(6))
                .with_retries(1),
        )
        .unwrap()
    }

    fn key() -> String {
        "svc-1".to_string()
    }

    #[tokio::test(start_paused = true)]
    async fn test_refreshes_entry_inside_window() {
        let cache = cache();
        let fetcher = Arc::new(VersionFetcher::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = cache.spawn_refresher(fetcher.clone(), shutdown_rx);

        cache.set(key(), 1);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(fetcher.calls(), 0);
        assert_eq!(cache.get(&key()).as_deref(), Some(&1));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(cache.get(&key()).as_deref(), Some(&100));

        // The refreshed entry lives past the original expiry
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(cache.get(&key()).is_some());
        assert_eq!(cache.stats().refresh_successes, fetcher.calls() as u64);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_retries_then_expires() {
        let cache = cache();
        let fetcher = Arc::new(VersionFetcher::failing());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = cache.spawn_refresher(fetcher.clone(), shutdown_rx);

        cache.set(key(), 1);

        // Stale value is still served while refreshes fail
        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(cache.get(&key()).as_deref(), Some(&1));
        assert_eq!(fetcher.calls(), 2);
        assert_eq!(cache.stats().refresh_failures, 2);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(cache.len(), 0);
        assert!(cache.get(&key()).is_none());
        assert_eq!(fetcher.calls(), 2);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_during_refresh_is_not_resurrected() {
        let cache = cache();
        let fetcher = Arc::new(VersionFetcher::slow(Duration::from_secs(1)));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = cache.spawn_refresher(fetcher.clone(), shutdown_rx);

        cache.set(key(), 1);
        tokio::time::sleep(Duration::from_millis(4500)).await;
        assert_eq!(fetcher.calls(), 1);
        assert!(cache.invalidate(&key()));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(cache.is_empty());
        assert_eq!(cache.stats().refresh_successes, 0);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_abandons_in_flight_pass() {
        let cache = cache();
        let fetcher = Arc::new(VersionFetcher::slow(Duration::from_secs(3600)));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = cache.spawn_refresher(fetcher.clone(), shutdown_rx);

        cache.set(key(), 1);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fetcher.calls(), 1);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("refresher should stop promptly")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_exits_when_cache_dropped() {
        let cache = cache();
        let fetcher = Arc::new(VersionFetcher::new());
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = cache.spawn_refresher(fetcher, shutdown_rx);

        drop(cache);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("refresher should notice the dropped cache")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_exits_when_already_signalled() {
        let cache = cache();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        shutdown_tx.send(true).unwrap();

        let handle = cache.spawn_refresher(Arc::new(VersionFetcher::new()), shutdown_rx);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("refresher should not start")
            .unwrap();
    }
}
