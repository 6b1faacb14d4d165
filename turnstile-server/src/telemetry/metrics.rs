//! Prometheus Metrics Definitions
//!
//! Authorization outcomes and latency are recorded as they happen. Cache and
//! report figures already live in the manager's stats, so they are copied
//! into gauges when the endpoint is scraped.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, Encoder, HistogramVec,
    IntCounterVec, IntGauge, TextEncoder,
};
use tokio::net::TcpListener;
use turnstile_authz::Manager;

use crate::constants::METRICS_PATH;
use crate::error::{ApiError, ApiResult};

/// Authorization latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const AUTHORIZATION_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance - initialized once at startup
pub static METRICS: Lazy<ApiResult<TurnstileMetrics>> = Lazy::new(TurnstileMetrics::new);

/// Outcome label of one authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Allowed,
    Denied,
    Error,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Allowed => "allowed",
            Outcome::Denied => "denied",
            Outcome::Error => "error",
        }
    }
}

#[derive(Clone)]
pub struct TurnstileMetrics {
    /// Authorization counter - labels: outcome
    pub authorizations_total: IntCounterVec,

    /// Authorization duration histogram - labels: outcome
    pub authorization_duration_seconds: HistogramVec,

    pub config_cache_entries: IntGauge,
    pub config_cache_hits: IntGauge,
    pub config_cache_misses: IntGauge,
    pub config_refresh_failures: IntGauge,
    pub config_cache_evictions: IntGauge,

    pub reports_pending: IntGauge,
    pub report_flushes: IntGauge,
    pub report_flush_failures: IntGauge,
}

fn registration_error(name: &str, err: prometheus::Error) -> ApiError {
    ApiError::internal_error(format!("Failed to register {}: {}", name, err))
}

fn gauge(name: &str, help: &str) -> ApiResult<IntGauge> {
    register_int_gauge!(name, help).map_err(|e| registration_error(name, e))
}

fn saturating_i64<T: TryInto<i64>>(value: T) -> i64 {
    value.try_into().unwrap_or(i64::MAX)
}

impl TurnstileMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            authorizations_total: register_int_counter_vec!(
                "turnstile_authorizations_total",
                "Total number of authorization decisions",
                &["outcome"]
            )
            .map_err(|e| registration_error("authorizations_total", e))?,

            authorization_duration_seconds: register_histogram_vec!(
                "turnstile_authorization_duration_seconds",
                "Authorization duration in seconds",
                &["outcome"],
                AUTHORIZATION_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_error("authorization_duration_seconds", e))?,

            config_cache_entries: gauge(
                "turnstile_config_cache_entries",
                "Current number of cached system configurations",
            )?,
            config_cache_hits: gauge(
                "turnstile_config_cache_hits",
                "Config cache lookups served from the cache",
            )?,
            config_cache_misses: gauge(
                "turnstile_config_cache_misses",
                "Config cache lookups that required a fetch",
            )?,
            config_refresh_failures: gauge(
                "turnstile_config_refresh_failures",
                "Failed background config refreshes",
            )?,
            config_cache_evictions: gauge(
                "turnstile_config_cache_evictions",
                "Config cache entries evicted by the size bound",
            )?,
            reports_pending: gauge(
                "turnstile_reports_pending",
                "Usage records waiting for the next flush",
            )?,
            report_flushes: gauge("turnstile_report_flushes", "Completed report flushes")?,
            report_flush_failures: gauge(
                "turnstile_report_flush_failures",
                "Report writes that failed and were requeued",
            )?,
        })
    }

    /// Record one authorization.
    pub fn record_authorization(&self, outcome: Outcome, duration_secs: f64) {
        self.authorizations_total
            .with_label_values(&[outcome.as_str()])
            .inc();
        self.authorization_duration_seconds
            .with_label_values(&[outcome.as_str()])
            .observe(duration_secs);
    }

    /// Copy the manager's cache and report stats into the gauges.
    pub fn observe_manager(&self, manager: &Manager) {
        let cache = manager.cache_stats();
        self.config_cache_entries.set(saturating_i64(cache.entries));
        self.config_cache_hits.set(saturating_i64(cache.hits));
        self.config_cache_misses.set(saturating_i64(cache.misses));
        self.config_refresh_failures
            .set(saturating_i64(cache.refresh_failures));
        self.config_cache_evictions.set(saturating_i64(cache.evictions));

        if let Some(reports) = manager.report_stats() {
            self.reports_pending.set(saturating_i64(reports.pending));
            self.report_flushes.set(saturating_i64(reports.flushes));
            self.report_flush_failures
                .set(saturating_i64(reports.flush_failures));
        }
    }
}

/// Handler for GET /metrics.
///
/// Returns Prometheus text format metrics.
pub async fn metrics_handler(State(manager): State<Arc<Manager>>) -> impl IntoResponse {
    if let Ok(metrics) = METRICS.as_ref() {
        metrics.observe_manager(&manager);
    }

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}

pub fn metrics_router(manager: Arc<Manager>) -> Router {
    Router::new()
        .route(METRICS_PATH, get(metrics_handler))
        .with_state(manager)
}

/// Serve the metrics router until the task is dropped or aborted.
pub async fn serve_metrics(listener: TcpListener, manager: Arc<Manager>) -> std::io::Result<()> {
    if let Err(e) = METRICS.as_ref() {
        tracing::warn!(error = %e, "Turnstile metrics failed to register");
    }
    axum::serve(listener, metrics_router(manager)).await
}
