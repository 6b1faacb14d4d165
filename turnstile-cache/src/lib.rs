//! Turnstile Cache - System Configuration Cache
//!
//! A bounded, TTL-based cache for system configuration lookups with an
//! independent background refresh loop.
//!
//! # Behaviour
//!
//! - Entries are never served past their hard expiry. [`ConfigCache::get`]
//!   on an expired entry removes it and reports a miss.
//! - An entry becomes due for refresh `refresh_interval` before it expires
//!   and keeps being served while the refresh is in flight.
//! - The cache is pull-populated: callers fetch on a miss and [`ConfigCache::set`]
//!   the result. The background loop only refreshes keys already present.
//! - When the bound is reached the least recently accessed entry is evicted.
//!
//! # Example
//!
//! ```ignore
//! let cache = ConfigCache::new(CacheConfig::default())?;
//! let refresher = cache.spawn_refresher(fetcher, shutdown_rx);
//!
//! if let Some(config) = cache.get(&service) {
//!     // serve from cache
//! }
//! ```

mod config_cache;
mod entry;
mod fetcher;
mod refresher;
mod stats;

pub use config_cache::ConfigCache;
pub use entry::CacheEntry;
pub use fetcher::ConfigFetcher;
pub use stats::{CacheStats, CacheStatsSnapshot};
