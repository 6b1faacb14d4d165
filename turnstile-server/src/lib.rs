//! Turnstile Server - Adapter Endpoint and Process Lifecycle
//!
//! Wires the authorization [`turnstile_authz::Manager`] to the outside world:
//!
//! - [`config::AdapterConfig`] reads `TURNSTILE_*` environment variables
//! - [`routes`] exposes `POST /v1/authorize` and the health probes
//! - [`server::HttpAdapterServer`] serves them and drains on close
//! - [`lifecycle::Coordinator`] turns termination signals into an orderly
//!   manager shutdown followed by a server close
//! - [`telemetry`] installs the tracing subscriber and the Prometheus metrics

pub mod config;
pub mod constants;
pub mod error;
pub mod lifecycle;
pub mod routes;
pub mod server;
pub mod state;
pub mod telemetry;

pub use config::AdapterConfig;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use lifecycle::{listen_for_signals, Coordinator, Signal};
pub use routes::create_router;
pub use server::{HttpAdapterServer, RpcServer, ServeResult};
pub use state::AppState;
