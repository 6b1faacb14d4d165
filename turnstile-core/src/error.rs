//! Error types for Turnstile operations

use thiserror::Error;

/// Failure talking to a remote system or backend API.
///
/// Timeouts are reported as [`FetchError::Transport`] with `timed_out` set;
/// callers treat every variant as the same kind of failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Request to {endpoint} failed: {reason}")]
    Transport {
        endpoint: String,
        reason: String,
        timed_out: bool,
    },

    #[error("Request to {endpoint} returned status {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },
}

impl FetchError {
    /// Whether the failure was caused by the client timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Transport { timed_out: true, .. })
    }
}

/// Authorization errors surfaced to the adapter boundary.
///
/// A denial is not an error; see [`crate::Decision`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthzError {
    #[error("Configuration unavailable for service {service_id}: {reason}")]
    ConfigUnavailable { service_id: String, reason: String },

    #[error("Backend unavailable for service {service_id}: {reason}")]
    BackendUnavailable { service_id: String, reason: String },

    #[error("Cache construction failed: {reason}")]
    CacheConstruction { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Invalid mapping rule pattern {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Process lifecycle errors. Both are fatal to the process.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Server failed to close: {reason}")]
    ShutdownFailed { reason: String },

    #[error("Server terminated unexpectedly: {reason}")]
    ServerTerminated { reason: String },

    #[error("Server failed to start: {reason}")]
    StartFailed { reason: String },
}

/// Master error type for all Turnstile errors.
#[derive(Debug, Clone, Error)]
pub enum TurnstileError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Authorization error: {0}")]
    Authz(#[from] AuthzError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),
}

/// Result type alias for Turnstile operations.
pub type TurnstileResult<T> = Result<T, TurnstileError>;

// =============================================================================
// TESTS
// =============================================================================
