//! Adapter Routes
//!
//! The adapter surface is deliberately small: one authorization endpoint and
//! the health probes. Metrics are served on their own listener.

pub mod authorize;
pub mod health;

use std::time::Duration;

use axum::Router;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::state::AppState;

/// Build the adapter router.
///
/// `request_timeout` bounds a single request; a slow one is answered with
/// 408 instead of holding its connection open.
pub fn create_router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .merge(authorize::create_router())
        .nest("/health", health::create_router())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
