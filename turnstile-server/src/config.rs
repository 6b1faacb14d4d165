//! Adapter Configuration
//!
//! Everything the process needs is read once from `TURNSTILE_*` environment
//! variables. Unset or unparsable values fall back to their defaults;
//! semantic checks happen in [`AdapterConfig::validate`].

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use turnstile_core::constants::{
    DEFAULT_BACKEND_URL, DEFAULT_CACHE_MAX_SIZE, DEFAULT_CACHE_REFRESH_INTERVAL_SECS,
    DEFAULT_CACHE_REFRESH_RETRIES, DEFAULT_CACHE_TTL_SECS, DEFAULT_CLIENT_TIMEOUT_SECS,
    DEFAULT_REPORT_FLUSH_INTERVAL_SECS, MAX_CONFIG_DURATION_SECS,
};
use turnstile_core::{BackendConfig, CacheConfig, ClientConfig, ConfigError};

use crate::constants::*;

// ============================================================================
// ADAPTER CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    // ========================================================================
    // System configuration cache
    // ========================================================================
    pub cache_entries_max: usize,
    pub cache_ttl: Duration,
    /// Margin before expiry at which a background refresh starts
    pub cache_refresh_interval: Duration,
    pub cache_refresh_retries: u32,

    // ========================================================================
    // Backend
    // ========================================================================
    /// Authorize per call and report usage in batches
    pub use_cached_backend: bool,
    pub backend_flush_interval: Duration,
    pub default_backend_url: String,

    // ========================================================================
    // HTTP client
    // ========================================================================
    pub client_timeout: Duration,
    pub allow_insecure_conn: bool,

    // ========================================================================
    // Adapter endpoint
    // ========================================================================
    /// `host:port`, `:port` or a bare port
    pub listen_addr: String,
    /// Upper bound on a single adapter request
    pub conn_max: Duration,
    pub shutdown_grace: Duration,

    // ========================================================================
    // Observability
    // ========================================================================
    pub log_level: String,
    pub log_json: bool,
    pub report_metrics: bool,
    pub metrics_port: u16,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            cache_entries_max: DEFAULT_CACHE_MAX_SIZE,
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            cache_refresh_interval: Duration::from_secs(DEFAULT_CACHE_REFRESH_INTERVAL_SECS),
            cache_refresh_retries: DEFAULT_CACHE_REFRESH_RETRIES,
            use_cached_backend: false,
            backend_flush_interval: Duration::from_secs(DEFAULT_REPORT_FLUSH_INTERVAL_SECS),
            default_backend_url: DEFAULT_BACKEND_URL.to_string(),
            client_timeout: Duration::from_secs(DEFAULT_CLIENT_TIMEOUT_SECS),
            allow_insecure_conn: false,
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            conn_max: Duration::from_secs(DEFAULT_CONN_MAX_SECS),
            shutdown_grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_json: false,
            report_metrics: false,
            metrics_port: DEFAULT_METRICS_PORT,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_secs(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_secs)
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl AdapterConfig {
    /// Create AdapterConfig from environment variables.
    ///
    /// Environment variables (defaults in parentheses):
    /// - `TURNSTILE_CACHE_ENTRIES_MAX` (1000)
    /// - `TURNSTILE_CACHE_TTL_SECONDS` (300)
    /// - `TURNSTILE_CACHE_REFRESH_SECONDS` (180)
    /// - `TURNSTILE_CACHE_REFRESH_RETRIES` (1)
    /// - `TURNSTILE_USE_CACHED_BACKEND` (false)
    /// - `TURNSTILE_BACKEND_FLUSH_SECONDS` (15)
    /// - `TURNSTILE_CLIENT_TIMEOUT_SECONDS` (10)
    /// - `TURNSTILE_ALLOW_INSECURE_CONN` (false)
    /// - `TURNSTILE_LISTEN_ADDR` ("0")
    /// - `TURNSTILE_CONN_MAX_SECONDS` (60)
    /// - `TURNSTILE_DEFAULT_BACKEND_URL` (https://su1.3scale.net)
    /// - `TURNSTILE_LOG_LEVEL` (info)
    /// - `TURNSTILE_LOG_JSON` (false)
    /// - `TURNSTILE_REPORT_METRICS` (false)
    /// - `TURNSTILE_METRICS_PORT` (8080)
    /// - `TURNSTILE_SHUTDOWN_GRACE_SECONDS` (5)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_entries_max: env_parse(ENV_CACHE_ENTRIES_MAX)
                .unwrap_or(defaults.cache_entries_max),
            cache_ttl: env_secs(ENV_CACHE_TTL_SECONDS).unwrap_or(defaults.cache_ttl),
            cache_refresh_interval: env_secs(ENV_CACHE_REFRESH_SECONDS)
                .unwrap_or(defaults.cache_refresh_interval),
            cache_refresh_retries: env_parse(ENV_CACHE_REFRESH_RETRIES)
                .unwrap_or(defaults.cache_refresh_retries),
            use_cached_backend: env_bool(ENV_USE_CACHED_BACKEND)
                .unwrap_or(defaults.use_cached_backend),
            backend_flush_interval: env_secs(ENV_BACKEND_FLUSH_SECONDS)
                .unwrap_or(defaults.backend_flush_interval),
            default_backend_url: env_string(ENV_DEFAULT_BACKEND_URL)
                .unwrap_or(defaults.default_backend_url),
            client_timeout: env_secs(ENV_CLIENT_TIMEOUT_SECONDS)
                .unwrap_or(defaults.client_timeout),
            allow_insecure_conn: env_bool(ENV_ALLOW_INSECURE_CONN)
                .unwrap_or(defaults.allow_insecure_conn),
            listen_addr: env_string(ENV_LISTEN_ADDR).unwrap_or(defaults.listen_addr),
            conn_max: env_secs(ENV_CONN_MAX_SECONDS).unwrap_or(defaults.conn_max),
            shutdown_grace: env_secs(ENV_SHUTDOWN_GRACE_SECONDS)
                .unwrap_or(defaults.shutdown_grace),
            log_level: env_string(ENV_LOG_LEVEL).unwrap_or(defaults.log_level),
            log_json: env_bool(ENV_LOG_JSON).unwrap_or(defaults.log_json),
            report_metrics: env_bool(ENV_REPORT_METRICS).unwrap_or(defaults.report_metrics),
            metrics_port: env_parse(ENV_METRICS_PORT).unwrap_or(defaults.metrics_port),
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .with_max_size(self.cache_entries_max)
            .with_ttl(self.cache_ttl)
            .with_refresh_interval(self.cache_refresh_interval)
            .with_retries(self.cache_refresh_retries)
    }

    pub fn backend_config(&self) -> BackendConfig {
        if self.use_cached_backend {
            BackendConfig::cached(self.backend_flush_interval)
        } else {
            BackendConfig::direct()
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: self.client_timeout,
            insecure_skip_verify: self.allow_insecure_conn,
            default_backend_url: self.default_backend_url.clone(),
        }
    }

    /// Socket address of the adapter endpoint.
    ///
    /// `"8090"` and `":8090"` bind every interface.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = self.listen_addr.trim();
        let port_only = raw.strip_prefix(':').unwrap_or(raw);
        if let Ok(port) = port_only.parse::<u16>() {
            return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port));
        }
        raw.parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue {
                field: ENV_LISTEN_ADDR.to_string(),
                value: raw.to_string(),
                reason: e.to_string(),
            })
    }

    /// Socket address of the Prometheus listener.
    pub fn metrics_addr(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.metrics_port)
    }

    /// Validate the configuration.
    ///
    /// Validates the derived cache, backend and client configurations, the
    /// listen address, that the per-request bound is positive, and that the
    /// process-level durations stay within [`MAX_CONFIG_DURATION_SECS`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cache_config().validate()?;
        self.backend_config().validate()?;
        self.client_config().validate()?;
        self.bind_addr()?;

        if self.conn_max.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: ENV_CONN_MAX_SECONDS.to_string(),
                value: "0".to_string(),
                reason: "conn_max must be positive".to_string(),
            });
        }

        let max = Duration::from_secs(MAX_CONFIG_DURATION_SECS);
        for (field, value) in [
            (ENV_CONN_MAX_SECONDS, self.conn_max),
            (ENV_SHUTDOWN_GRACE_SECONDS, self.shutdown_grace),
        ] {
            if value > max {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: value.as_secs().to_string(),
                    reason: format!("must not exceed {}s", MAX_CONFIG_DURATION_SECS),
                });
            }
        }

        if self.report_metrics && self.metrics_port == 0 {
            return Err(ConfigError::InvalidValue {
                field: ENV_METRICS_PORT.to_string(),
                value: "0".to_string(),
                reason: "metrics port is required when metrics are reported".to_string(),
            });
        }

        Ok(())
    }
}
