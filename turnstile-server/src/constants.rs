//! Constants for the Turnstile adapter server
//!
//! Environment variable names and defaults for the process-level settings.
//! Cache, backend and client defaults live in `turnstile_core::constants`.

// ============================================================================
// ENVIRONMENT
// ============================================================================

pub const ENV_CACHE_ENTRIES_MAX: &str = "TURNSTILE_CACHE_ENTRIES_MAX";
pub const ENV_CACHE_TTL_SECONDS: &str = "TURNSTILE_CACHE_TTL_SECONDS";
pub const ENV_CACHE_REFRESH_SECONDS: &str = "TURNSTILE_CACHE_REFRESH_SECONDS";
pub const ENV_CACHE_REFRESH_RETRIES: &str = "TURNSTILE_CACHE_REFRESH_RETRIES";
pub const ENV_USE_CACHED_BACKEND: &str = "TURNSTILE_USE_CACHED_BACKEND";
pub const ENV_BACKEND_FLUSH_SECONDS: &str = "TURNSTILE_BACKEND_FLUSH_SECONDS";
pub const ENV_CLIENT_TIMEOUT_SECONDS: &str = "TURNSTILE_CLIENT_TIMEOUT_SECONDS";
pub const ENV_ALLOW_INSECURE_CONN: &str = "TURNSTILE_ALLOW_INSECURE_CONN";
pub const ENV_LISTEN_ADDR: &str = "TURNSTILE_LISTEN_ADDR";
pub const ENV_CONN_MAX_SECONDS: &str = "TURNSTILE_CONN_MAX_SECONDS";
pub const ENV_DEFAULT_BACKEND_URL: &str = "TURNSTILE_DEFAULT_BACKEND_URL";
pub const ENV_LOG_LEVEL: &str = "TURNSTILE_LOG_LEVEL";
pub const ENV_LOG_JSON: &str = "TURNSTILE_LOG_JSON";
pub const ENV_REPORT_METRICS: &str = "TURNSTILE_REPORT_METRICS";
pub const ENV_METRICS_PORT: &str = "TURNSTILE_METRICS_PORT";
pub const ENV_SHUTDOWN_GRACE_SECONDS: &str = "TURNSTILE_SHUTDOWN_GRACE_SECONDS";

// ============================================================================
// LISTENER
// ============================================================================

/// Default listen address; a bare port binds all interfaces
pub const DEFAULT_LISTEN_ADDR: &str = "0";

/// Default upper bound on a single adapter request in seconds
pub const DEFAULT_CONN_MAX_SECS: u64 = 60;

/// Default port of the Prometheus listener
pub const DEFAULT_METRICS_PORT: u16 = 8080;

// ============================================================================
// LOGGING
// ============================================================================

/// Default log level when neither `RUST_LOG` nor `TURNSTILE_LOG_LEVEL` is set
pub const DEFAULT_LOG_LEVEL: &str = "info";

// ============================================================================
// SHUTDOWN
// ============================================================================

/// Default bound on waiting for the manager's background tasks
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;

// ============================================================================
// ROUTES
// ============================================================================

pub const AUTHORIZE_PATH: &str = "/v1/authorize";
pub const METRICS_PATH: &str = "/metrics";
