//! Shared reqwest client construction.

use reqwest::Client;
use turnstile_core::{ClientConfig, ConfigError};

const USER_AGENT: &str = concat!("turnstile/", env!("CARGO_PKG_VERSION"));

/// Build the HTTP client shared by the system and backend clients.
///
/// Applies the per-call timeout and, when configured, disables TLS
/// certificate verification.
pub fn build_http_client(config: &ClientConfig) -> Result<Client, ConfigError> {
    config.validate()?;

    if config.insecure_skip_verify {
        tracing::warn!("TLS certificate verification is disabled for outbound connections");
    }

    Client::builder()
        .timeout(config.timeout)
        .danger_accept_invalid_certs(config.insecure_skip_verify)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| ConfigError::InvalidValue {
            field: "http_client".to_string(),
            value: format!("{:?}", config.timeout),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_builds_with_defaults() {
        assert!(build_http_client(&ClientConfig::default()).is_ok());
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = ClientConfig {
            timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(build_http_client(&config).is_err());
    }
}
