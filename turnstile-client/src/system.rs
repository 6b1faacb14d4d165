//! System API client.

use async_trait::async_trait;
use reqwest::Client;
use turnstile_core::constants::SYSTEM_CONFIG_ENVIRONMENT;
use turnstile_core::{FetchError, ServiceRef, SystemConfig};

use crate::transport_error;
use crate::wire::ProxyConfigEnvelope;

/// Source of per-service proxy configuration.
#[async_trait]
pub trait SystemApi: Send + Sync {
    /// Fetch the latest published configuration of a service.
    async fn fetch_config(&self, service: &ServiceRef) -> Result<SystemConfig, FetchError>;
}

/// Parse a proxy configuration document as published by the system API.
pub fn parse_proxy_config(body: &[u8]) -> Result<SystemConfig, String> {
    let envelope: ProxyConfigEnvelope = serde_json::from_slice(body).map_err(|e| e.to_string())?;
    envelope.proxy_config.into_system_config()
}

/// [`SystemApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSystemClient {
    client: Client,
}

impl HttpSystemClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn endpoint(service: &ServiceRef) -> String {
        format!(
            "{}/admin/api/services/{}/proxy/configs/{}/latest.json",
            service.system_url, service.service_id, SYSTEM_CONFIG_ENVIRONMENT
        )
    }
}

#[async_trait]
impl SystemApi for HttpSystemClient {
    async fn fetch_config(&self, service: &ServiceRef) -> Result<SystemConfig, FetchError> {
        let endpoint = Self::endpoint(service);

        let response = self
            .client
            .get(&endpoint)
            .query(&[("access_token", service.access_token.as_str())])
            .send()
            .await
            .map_err(|e| transport_error(&endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                endpoint,
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(&endpoint, e))?;
        let config = parse_proxy_config(&body).map_err(|reason| FetchError::InvalidResponse {
            endpoint: endpoint.clone(),
            reason,
        })?;

        tracing::debug!(
            service = %service,
            version = config.version,
            rules = config.mapping_rules.len(),
            "Fetched system configuration"
        );

        Ok(config)
    }
}
