//! Authorization manager.
//!
//! Composes the config cache, the system client and the backend facade to
//! answer "is this call allowed, and record it". The manager owns the
//! background refresh and flush tasks: they are spawned by [`Manager::new`]
//! and stopped by [`Manager::shutdown`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use turnstile_cache::{CacheStatsSnapshot, ConfigCache, ConfigFetcher};
use turnstile_client::SystemApi;
use turnstile_core::constants::MAX_CONFIG_DURATION_SECS;
use turnstile_core::{
    AuthzError, BackendConfig, CacheConfig, Decision, FetchError, ServiceRef, SystemConfig,
};

use crate::backend::BackendFacade;
use crate::report::{self, ReportCache, ReportStatsSnapshot};
use crate::request::{AuthRequest, Clients};

/// Reason given when a service has mapping rules and none matches the call.
pub const NO_MAPPING_RULE_MATCHED: &str = "no mapping rule matched";

const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Adapts the system client to the cache's fetcher interface.
pub struct SystemFetcher {
    system: Arc<dyn SystemApi>,
}

impl SystemFetcher {
    pub fn new(system: Arc<dyn SystemApi>) -> Self {
        Self { system }
    }
}

#[async_trait]
impl ConfigFetcher<ServiceRef, SystemConfig> for SystemFetcher {
    async fn fetch(&self, key: &ServiceRef) -> Result<SystemConfig, FetchError> {
        self.system.fetch_config(key).await
    }
}

pub struct Manager {
    cache: ConfigCache<ServiceRef, SystemConfig>,
    fetcher: Arc<SystemFetcher>,
    backend: BackendFacade,
    default_backend_url: String,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
    shutting_down: AtomicBool,
    shutdown_grace: Duration,
}

impl Manager {
    /// Build a manager and start its background tasks.
    ///
    /// Must be called inside a Tokio runtime. Fails without spawning
    /// anything when the cache or backend configuration is invalid, such
    /// as caching enabled with a zero flush interval.
    pub fn new(
        clients: Clients,
        cache_config: CacheConfig,
        backend_config: BackendConfig,
    ) -> Result<Self, AuthzError> {
        backend_config
            .validate()
            .map_err(|e| AuthzError::CacheConstruction {
                reason: e.to_string(),
            })?;
        let cache = ConfigCache::new(cache_config).map_err(|e| AuthzError::CacheConstruction {
            reason: e.to_string(),
        })?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let fetcher = Arc::new(SystemFetcher::new(clients.system));

        let mut tasks = Vec::with_capacity(2);
        tasks.push((
            "config-refresh",
            cache.spawn_refresher(fetcher.clone(), shutdown_rx.clone()),
        ));

        let backend = if backend_config.enable_caching {
            let reports = Arc::new(ReportCache::new());
            tasks.push((
                "report-flush",
                tokio::spawn(report::flush_task(
                    reports.clone(),
                    clients.backend.clone(),
                    backend_config.cache_flush_interval,
                    shutdown_rx,
                )),
            ));
            BackendFacade::cached(clients.backend, reports)
        } else {
            BackendFacade::direct(clients.backend)
        };

        tracing::info!(
            max_size = cache.config().max_size,
            ttl_secs = cache.config().ttl.as_secs(),
            refresh_interval_secs = cache.config().refresh_interval.as_secs(),
            cached_backend = backend_config.enable_caching,
            "Authorization manager started"
        );

        Ok(Self {
            cache,
            fetcher,
            backend,
            default_backend_url: clients.default_backend_url,
            shutdown_tx,
            tasks: Mutex::new(tasks),
            shutting_down: AtomicBool::new(false),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        })
    }

    /// Bound on how long [`Manager::shutdown`] waits for background tasks.
    ///
    /// Clamped to [`MAX_CONFIG_DURATION_SECS`].
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace.min(Duration::from_secs(MAX_CONFIG_DURATION_SECS));
        self
    }

    /// Authorize a call and record its usage.
    ///
    /// A denial is `Ok`. Errors mean the decision could not be made and the
    /// call must not be treated as allowed.
    pub async fn authorize(&self, request: &AuthRequest) -> Result<Decision, AuthzError> {
        let service = &request.identity.service;
        let config = self.config_for(service).await?;

        let usage = match &request.usage {
            Some(usage) if !usage.is_empty() => usage.clone(),
            _ => match config.usage_for(&request.method, &request.path) {
                Some(usage) => usage,
                None => {
                    tracing::debug!(
                        service_id = %service.service_id,
                        method = %request.method,
                        path = %request.path,
                        "No mapping rule matched"
                    );
                    return Ok(Decision::denied(NO_MAPPING_RULE_MATCHED));
                }
            },
        };

        let target = config.backend_target(&self.default_backend_url);
        let credentials = &request.identity.credentials;
        let decision = self
            .backend
            .authorize(&target, credentials, &usage)
            .await
            .map_err(|e| {
                tracing::warn!(
                    service_id = %service.service_id,
                    app = credentials.log_id(),
                    error = %e,
                    "Backend authorization failed"
                );
                AuthzError::BackendUnavailable {
                    service_id: service.service_id.clone(),
                    reason: e.to_string(),
                }
            })?;

        tracing::debug!(
            service_id = %service.service_id,
            app = credentials.log_id(),
            allowed = decision.allowed,
            reason = decision.reason.as_deref().unwrap_or(""),
            "Authorization decided"
        );
        Ok(decision)
    }

    /// Cached config, fetched synchronously on a miss.
    async fn config_for(&self, service: &ServiceRef) -> Result<Arc<SystemConfig>, AuthzError> {
        if let Some(config) = self.cache.get(service) {
            return Ok(config);
        }

        let config = self.fetcher.fetch(service).await.map_err(|e| {
            tracing::warn!(service = %service, error = %e, "System configuration fetch failed");
            AuthzError::ConfigUnavailable {
                service_id: service.service_id.clone(),
                reason: e.to_string(),
            }
        })?;

        self.cache.set(service.clone(), config.clone());
        Ok(Arc::new(config))
    }

    /// Stop background work.
    ///
    /// The first call stops buffering (waiting for buffered calls in flight
    /// to record their usage), signals the tasks and waits up to the grace
    /// period for them (the flush task performs a final flush), then aborts
    /// any task still running. Concurrent callers wait for that drain to
    /// finish; later calls return immediately.
    pub async fn shutdown(&self) {
        let mut tasks = self.tasks.lock().await;
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            tracing::debug!("Authorization manager already shut down");
            return;
        }

        tracing::info!(
            grace_secs = self.shutdown_grace.as_secs(),
            "Authorization manager shutting down"
        );
        self.backend.stop_buffering().await;
        self.shutdown_tx.send_replace(true);

        let deadline = Instant::now() + self.shutdown_grace;
        for (name, mut handle) in tasks.drain(..) {
            match timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => tracing::debug!(task = name, "Background task stopped"),
                Ok(Err(e)) => tracing::warn!(task = name, error = %e, "Background task failed"),
                Err(_) => {
                    tracing::warn!(task = name, "Background task did not stop in time, aborting");
                    handle.abort();
                }
            }
        }

        // Requeued by a failed final flush
        if let Some(reports) = self.backend.reports() {
            if reports.pending() > 0 {
                let summary = reports.flush(self.backend.backend().as_ref()).await;
                tracing::info!(
                    records_sent = summary.records_sent,
                    records_requeued = summary.records_requeued,
                    "Retried requeued usage during shutdown"
                );
            }
        }

        tracing::info!("Authorization manager shut down");
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub fn cache(&self) -> &ConfigCache<ServiceRef, SystemConfig> {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStatsSnapshot {
        self.cache.stats()
    }

    /// Report counters, or `None` in direct mode.
    pub fn report_stats(&self) -> Option<ReportStatsSnapshot> {
        self.backend.reports().map(|reports| reports.stats())
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("backend", &self.backend)
            .field("default_backend_url", &self.default_backend_url)
            .field("shutting_down", &self.is_shutting_down())
            .finish_non_exhaustive()
    }
}
