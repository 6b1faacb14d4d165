//! Turnstile Telemetry
//!
//! Structured logging through `tracing` and Prometheus metrics served on a
//! listener of their own.

pub mod metrics;
pub mod tracer;

pub use metrics::{metrics_router, serve_metrics, Outcome, TurnstileMetrics, METRICS};
pub use tracer::{init_tracing, level_filter};
