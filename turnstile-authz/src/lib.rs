//! Turnstile Authz - Authorization Core
//!
//! The [`Manager`] answers "is this call allowed, and record it" on top of:
//!
//! - a [`turnstile_cache::ConfigCache`] of system configurations, read-through
//!   on a miss and refreshed in the background
//! - a [`BackendFacade`] that either calls the backend directly per request
//!   or authorizes and buffers usage in a [`ReportCache`] flushed periodically
//!
//! # Example
//!
//! ```ignore
//! let clients = Clients::http(&client_config)?;
//! let manager = Manager::new(clients, CacheConfig::default(), BackendConfig::cached(interval))?;
//!
//! let decision = manager.authorize(&request).await?;
//! manager.shutdown().await;
//! ```

mod backend;
mod manager;
mod report;
mod request;

pub use backend::BackendFacade;
pub use manager::{Manager, SystemFetcher, NO_MAPPING_RULE_MATCHED};
pub use report::{FlushSummary, ReportCache, ReportStats, ReportStatsSnapshot};
pub use request::{AuthRequest, Clients};

use tokio::sync::watch;

/// Resolves once the stop flag is set or the sender is gone.
pub(crate) async fn stop_requested(shutdown_rx: &mut watch::Receiver<bool>) {
    let _ = shutdown_rx.wait_for(|stop| *stop).await;
}
