//! Fetcher trait used to refresh cached values.

use async_trait::async_trait;
use turnstile_core::FetchError;

/// Loads the authoritative value for a cache key.
///
/// The manager uses the same fetcher for synchronous misses and the
/// refresh loop uses it for background refreshes.
#[async_trait]
pub trait ConfigFetcher<K, V>: Send + Sync {
    async fn fetch(&self, key: &K) -> Result<V, FetchError>;
}
