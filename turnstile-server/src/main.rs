//! Turnstile adapter entry point
//!
//! Reads the environment, builds the authorization manager, starts the
//! adapter endpoint and hands control to the lifecycle coordinator.

use std::sync::Arc;

use tokio::sync::mpsc;
use turnstile_authz::{Clients, Manager};
use turnstile_core::{LifecycleError, TurnstileResult};
use turnstile_server::telemetry::{init_tracing, serve_metrics};
use turnstile_server::{
    create_router, listen_for_signals, AdapterConfig, AppState, Coordinator, HttpAdapterServer,
    RpcServer,
};

fn start_failed(context: &str, e: impl std::fmt::Display) -> LifecycleError {
    LifecycleError::StartFailed {
        reason: format!("{}: {}", context, e),
    }
}

#[tokio::main]
async fn main() -> TurnstileResult<()> {
    let config = AdapterConfig::from_env();
    init_tracing(&config)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Turnstile adapter");
    config.validate()?;

    let clients = Clients::http(&config.client_config())?;
    let manager = Arc::new(
        Manager::new(clients, config.cache_config(), config.backend_config())?
            .with_shutdown_grace(config.shutdown_grace),
    );

    let metrics_task = if config.report_metrics {
        let addr = config.metrics_addr();
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| start_failed(&format!("Failed to bind metrics listener {}", addr), e))?;
        tracing::info!(%addr, "Serving metrics");
        let manager = manager.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = serve_metrics(listener, manager).await {
                tracing::error!(error = %e, "Metrics listener failed");
            }
        }))
    } else {
        None
    };

    let router = create_router(AppState::new(manager.clone()), config.conn_max);
    let addr = config.bind_addr()?;
    let server = Arc::new(
        HttpAdapterServer::bind(addr, router)
            .await
            .map_err(|e| start_failed(&format!("Failed to bind {}", addr), e))?,
    );

    let signals =
        listen_for_signals().map_err(|e| start_failed("Failed to install signal handlers", e))?;
    let (done_tx, done_rx) = mpsc::channel(1);
    server
        .run(done_tx)
        .await
        .map_err(|e| start_failed("Failed to start adapter server", e))?;

    let result = Coordinator::new(manager, server).run(signals, done_rx).await;

    if let Some(task) = metrics_task {
        task.abort();
    }
    result?;
    Ok(())
}
