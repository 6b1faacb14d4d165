//! Constants for Turnstile
//!
//! Default values used when the configuration loader leaves a field unset.

// ============================================================================
// SYSTEM CONFIGURATION CACHE
// ============================================================================

/// Default maximum number of cached system configurations
pub const DEFAULT_CACHE_MAX_SIZE: usize = 1000;

/// Default time-to-live of a cached system configuration in seconds (5 minutes)
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Default refresh margin before hard expiry in seconds (3 minutes)
pub const DEFAULT_CACHE_REFRESH_INTERVAL_SECS: u64 = 180;

/// Default number of retries for a failed background refresh
pub const DEFAULT_CACHE_REFRESH_RETRIES: u32 = 1;

/// Upper bound for any configured duration in seconds (one year).
/// Deadlines are computed as `now + duration`, which must stay representable.
pub const MAX_CONFIG_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

// ============================================================================
// BACKEND REPORTING
// ============================================================================

/// Default flush interval for cached usage reports in seconds
pub const DEFAULT_REPORT_FLUSH_INTERVAL_SECS: u64 = 15;

/// Metric charged when a configuration carries no mapping rules
pub const DEFAULT_METRIC: &str = "hits";

// ============================================================================
// HTTP CLIENT
// ============================================================================

/// Default per-call timeout for remote APIs in seconds
pub const DEFAULT_CLIENT_TIMEOUT_SECS: u64 = 10;

/// Backend used when a system configuration does not name one
pub const DEFAULT_BACKEND_URL: &str = "https://su1.3scale.net";

/// Proxy configuration environment queried on the system API
pub const SYSTEM_CONFIG_ENVIRONMENT: &str = "production";
