//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::FromRef;
use turnstile_authz::Manager;

/// Application-wide state shared across all routes.
///
/// The manager is built by the entrypoint and injected here; nothing in the
/// server crate holds a process-wide instance.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<Manager>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(manager: Arc<Manager>) -> Self {
        Self {
            manager,
            start_time: Instant::now(),
        }
    }
}

impl FromRef<AppState> for Arc<Manager> {
    fn from_ref(state: &AppState) -> Self {
        state.manager.clone()
    }
}
