//! Turnstile Client - Remote API Clients
//!
//! Thin reqwest clients for the two remote APIs the authorization core
//! depends on:
//!
//! - the **system** API, which publishes per-service proxy configuration
//! - the **backend** API, which authorizes calls and records usage
//!
//! Both are exposed behind traits ([`SystemApi`], [`BackendApi`]) so the
//! manager can be exercised against in-process mocks. Any transport error,
//! timeout or unexpected status is a [`turnstile_core::FetchError`].

mod backend;
mod builder;
mod system;
mod wire;

pub use backend::{BackendApi, HttpBackendClient, Transaction};
pub use builder::build_http_client;
pub use system::{parse_proxy_config, HttpSystemClient, SystemApi};

use turnstile_core::FetchError;

/// Convert a reqwest error into a transport failure for `endpoint`.
pub(crate) fn transport_error(endpoint: &str, e: reqwest::Error) -> FetchError {
    FetchError::Transport {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
        timed_out: e.is_timeout(),
    }
}
