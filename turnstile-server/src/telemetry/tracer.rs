//! Tracing subscriber initialization
//!
//! `RUST_LOG` wins when set; otherwise the filter comes from
//! `TURNSTILE_LOG_LEVEL`. Output is plain text unless `TURNSTILE_LOG_JSON`.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use turnstile_core::{ConfigError, LifecycleError, TurnstileResult};

use crate::config::AdapterConfig;
use crate::constants::ENV_LOG_LEVEL;

/// Parse a filter directive such as `info` or `turnstile_authz=debug,warn`.
pub fn level_filter(level: &str) -> Result<EnvFilter, ConfigError> {
    EnvFilter::try_new(level).map_err(|e| ConfigError::InvalidValue {
        field: ENV_LOG_LEVEL.to_string(),
        value: level.to_string(),
        reason: e.to_string(),
    })
}

/// Install the global subscriber. Call once, before anything logs.
pub fn init_tracing(config: &AdapterConfig) -> TurnstileResult<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => level_filter(&config.log_level)?,
    };

    let json_layer = config.log_json.then(|| fmt::layer().json());
    let text_layer = (!config.log_json).then(fmt::layer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .map_err(|e| LifecycleError::StartFailed {
            reason: format!("Failed to init subscriber: {}", e),
        })?;

    tracing::debug!(
        log_level = %config.log_level,
        json = config.log_json,
        "Tracing initialized"
    );
    Ok(())
}
