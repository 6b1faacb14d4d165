//! Configuration value objects
//!
//! These are immutable once handed to the cache, manager or client builder.
//! Parsing them out of the environment is the server crate's job.

use std::time::Duration;

use crate::constants::*;
use crate::error::ConfigError;

/// Reject durations too large to be added to an `Instant`.
fn check_duration_bound(field: &str, value: Duration) -> Result<(), ConfigError> {
    if value > Duration::from_secs(MAX_CONFIG_DURATION_SECS) {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: format!("{:?}", value),
            reason: format!("must not exceed {}s", MAX_CONFIG_DURATION_SECS),
        });
    }
    Ok(())
}

// ============================================================================
// CACHE CONFIGURATION
// ============================================================================

/// Configuration for the system configuration cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of cached entries (must be > 0)
    pub max_size: usize,
    /// Hard lifetime of a cached value
    pub ttl: Duration,
    /// Margin before hard expiry at which a background refresh starts.
    /// Must satisfy `0 < refresh_interval < ttl`.
    pub refresh_interval: Duration,
    /// How many times a failed background refresh is retried
    pub num_retry_failed_refresh: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_CACHE_MAX_SIZE,
            ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            refresh_interval: Duration::from_secs(DEFAULT_CACHE_REFRESH_INTERVAL_SECS),
            num_retry_failed_refresh: DEFAULT_CACHE_REFRESH_RETRIES,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of entries.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Set the entry TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the refresh margin.
    pub fn with_refresh_interval(mut self, refresh_interval: Duration) -> Self {
        self.refresh_interval = refresh_interval;
        self
    }

    /// Set the refresh retry budget.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.num_retry_failed_refresh = retries;
        self
    }

    /// Period of the background refresh loop.
    ///
    /// An entry becomes due `refresh_interval` before it expires and may be
    /// attempted `num_retry_failed_refresh + 1` times; dividing the margin by
    /// one more than that keeps every attempt inside the stale window.
    pub fn refresh_tick(&self) -> Duration {
        let slots = self.num_retry_failed_refresh.saturating_add(2);
        (self.refresh_interval / slots).max(Duration::from_millis(1))
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - max_size > 0
    /// - 0 < ttl <= MAX_CONFIG_DURATION_SECS
    /// - 0 < refresh_interval < ttl
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_size".to_string(),
                value: self.max_size.to_string(),
                reason: "max_size must be greater than 0".to_string(),
            });
        }

        if self.ttl.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "ttl".to_string(),
                value: format!("{:?}", self.ttl),
                reason: "ttl must be positive".to_string(),
            });
        }
        check_duration_bound("ttl", self.ttl)?;

        if self.refresh_interval.is_zero() || self.refresh_interval >= self.ttl {
            return Err(ConfigError::InvalidValue {
                field: "refresh_interval".to_string(),
                value: format!("{:?}", self.refresh_interval),
                reason: format!(
                    "refresh_interval must be positive and shorter than ttl ({:?})",
                    self.ttl
                ),
            });
        }

        Ok(())
    }
}

// ============================================================================
// BACKEND CONFIGURATION
// ============================================================================

/// Configuration for the backend usage/rate-limit facade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Buffer usage reports locally and flush them periodically
    pub enable_caching: bool,
    /// Flush period; required (non-zero) when caching is enabled
    pub cache_flush_interval: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            enable_caching: false,
            cache_flush_interval: Duration::ZERO,
        }
    }
}

impl BackendConfig {
    /// Direct mode: every authorization is one synchronous authrep call.
    pub fn direct() -> Self {
        Self::default()
    }

    /// Cached mode with the given flush interval.
    pub fn cached(cache_flush_interval: Duration) -> Self {
        Self {
            enable_caching: true,
            cache_flush_interval,
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enable_caching && self.cache_flush_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "cache_flush_interval".to_string(),
                value: format!("{:?}", self.cache_flush_interval),
                reason: "cache_flush_interval is required when caching is enabled".to_string(),
            });
        }
        check_duration_bound("cache_flush_interval", self.cache_flush_interval)?;
        Ok(())
    }
}

// ============================================================================
// HTTP CLIENT CONFIGURATION
// ============================================================================

/// Configuration for the HTTP clients talking to the system and backend APIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Per-call timeout
    pub timeout: Duration,
    /// Skip TLS certificate verification
    pub insecure_skip_verify: bool,
    /// Backend used when a system configuration names none
    pub default_backend_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_CLIENT_TIMEOUT_SECS),
            insecure_skip_verify: false,
            default_backend_url: DEFAULT_BACKEND_URL.to_string(),
        }
    }
}

impl ClientConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "timeout".to_string(),
                value: format!("{:?}", self.timeout),
                reason: "timeout must be positive".to_string(),
            });
        }
        check_duration_bound("timeout", self.timeout)?;
        if self.default_backend_url.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "default_backend_url".to_string(),
            });
        }
        Ok(())
    }
}
