//! Authorization requests and the clients a manager talks to.

use std::sync::Arc;

use turnstile_client::{build_http_client, BackendApi, HttpBackendClient, HttpSystemClient, SystemApi};
use turnstile_core::{ClientConfig, ConfigError, Identity, UsageDelta};

/// One call to authorize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    pub identity: Identity,
    /// Upstream request method, used for mapping rules
    pub method: String,
    /// Upstream request path, used for mapping rules
    pub path: String,
    /// Explicit usage; when absent it is derived from the mapping rules
    pub usage: Option<UsageDelta>,
}

impl AuthRequest {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            method: "GET".to_string(),
            path: "/".to_string(),
            usage: None,
        }
    }

    pub fn with_route(mut self, method: impl Into<String>, path: impl Into<String>) -> Self {
        self.method = method.into();
        self.path = path.into();
        self
    }

    pub fn with_usage(mut self, usage: UsageDelta) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Remote API clients used by the manager.
#[derive(Clone)]
pub struct Clients {
    pub system: Arc<dyn SystemApi>,
    pub backend: Arc<dyn BackendApi>,
    /// Backend used for services whose configuration names none
    pub default_backend_url: String,
}

impl Clients {
    pub fn new(
        system: Arc<dyn SystemApi>,
        backend: Arc<dyn BackendApi>,
        default_backend_url: impl Into<String>,
    ) -> Self {
        Self {
            system,
            backend,
            default_backend_url: default_backend_url.into(),
        }
    }

    /// HTTP clients sharing one connection pool.
    pub fn http(config: &ClientConfig) -> Result<Self, ConfigError> {
        let client = build_http_client(config)?;
        Ok(Self::new(
            Arc::new(HttpSystemClient::new(client.clone())),
            Arc::new(HttpBackendClient::new(client)),
            config.default_backend_url.clone(),
        ))
    }
}

impl std::fmt::Debug for Clients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clients")
            .field("default_backend_url", &self.default_backend_url)
            .finish_non_exhaustive()
    }
}
