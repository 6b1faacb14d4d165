//! Health Check Endpoints
//!
//! - /health/live - Process alive check
//! - /health/ready - Not ready once the manager has begun shutting down

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthDetails {
    pub version: String,
    pub uptime_seconds: u64,
    pub cached_configs: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_reports: Option<usize>,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /health/live
pub async fn liveness() -> impl IntoResponse {
    let response = HealthResponse {
        status: HealthStatus::Healthy,
        message: Some("Process is alive".to_string()),
        details: None,
    };
    (StatusCode::OK, Json(response))
}

/// GET /health/ready
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let manager = &state.manager;
    let shutting_down = manager.is_shutting_down();

    let response = HealthResponse {
        status: if shutting_down {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Healthy
        },
        message: shutting_down.then(|| "Shutting down".to_string()),
        details: Some(HealthDetails {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: state.start_time.elapsed().as_secs(),
            cached_configs: manager.cache_stats().entries,
            pending_reports: manager.report_stats().map(|stats| stats.pending),
        }),
    };

    let status_code = if shutting_down {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (status_code, Json(response))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/live", get(liveness))
        .route("/ready", get(readiness))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: HealthStatus::Healthy,
            message: None,
            details: Some(HealthDetails {
                version: "0.4.0".to_string(),
                uptime_seconds: 12,
                cached_configs: 3,
                pending_reports: None,
            }),
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["details"]["cached_configs"], 3);
        assert!(json.get("message").is_none());
        assert!(json["details"].get("pending_reports").is_none());
    }
}
