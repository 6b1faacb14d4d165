//! Authorization endpoint
//!
//! `POST /v1/authorize` takes the service reference, the application
//! credentials and the upstream route, and answers:
//!
//! - 200 `{"allowed": true}` when the call may proceed
//! - 403 `PERMISSION_DENIED` with the backend's reason when it may not
//! - 503 `UNAVAILABLE` when no decision could be made
//! - 400 for malformed requests

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use turnstile_authz::{AuthRequest, Manager};
use turnstile_core::{AppCredentials, Identity, ServiceRef, UsageDelta};

use crate::constants::AUTHORIZE_PATH;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::telemetry::metrics::{Outcome, METRICS};

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorizeRequest {
    pub system_url: String,
    pub service_id: String,
    pub access_token: String,
    #[serde(default)]
    pub credentials: CredentialsBody,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Explicit usage; mapping rules decide when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageDelta>,
}

/// Either `user_key` or `app_id` (with an optional `app_key`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialsBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizeResponse {
    pub allowed: bool,
}

fn required(field: &str, value: String) -> ApiResult<String> {
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(ApiError::missing_field(field));
    }
    Ok(value)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl CredentialsBody {
    /// A user key wins over an application id when both are present.
    pub fn into_credentials(self) -> ApiResult<AppCredentials> {
        match (non_empty(self.user_key), non_empty(self.app_id)) {
            (Some(user_key), _) => Ok(AppCredentials::user_key(user_key)),
            (None, Some(app_id)) => Ok(AppCredentials::app_id(app_id, non_empty(self.app_key))),
            (None, None) => Err(ApiError::missing_field("credentials.user_key")
                .with_details(serde_json::json!({
                    "accepted": ["credentials.user_key", "credentials.app_id"]
                }))),
        }
    }
}

impl AuthorizeRequest {
    pub fn into_auth_request(self) -> ApiResult<AuthRequest> {
        let service = ServiceRef::new(
            required("system_url", self.system_url)?,
            required("service_id", self.service_id)?,
            required("access_token", self.access_token)?,
        );
        let credentials = self.credentials.into_credentials()?;

        let mut request = AuthRequest::new(Identity::new(service, credentials));
        if let Some(method) = non_empty(self.method) {
            request.method = method.to_uppercase();
        }
        if let Some(path) = non_empty(self.path) {
            request.path = path;
        }
        if let Some(usage) = self.usage {
            request = request.with_usage(usage);
        }
        Ok(request)
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

/// POST /v1/authorize
pub async fn authorize(
    State(manager): State<Arc<Manager>>,
    body: Result<Json<AuthorizeRequest>, JsonRejection>,
) -> ApiResult<Json<AuthorizeResponse>> {
    let Json(body) = body.map_err(|e| ApiError::invalid_input(e.body_text()))?;
    let request = body.into_auth_request()?;

    let start = Instant::now();
    let result = manager.authorize(&request).await;
    let elapsed = start.elapsed().as_secs_f64();

    let outcome = match &result {
        Ok(decision) if decision.is_allowed() => Outcome::Allowed,
        Ok(_) => Outcome::Denied,
        Err(_) => Outcome::Error,
    };
    if let Ok(metrics) = METRICS.as_ref() {
        metrics.record_authorization(outcome, elapsed);
    }

    let decision = result?;
    if decision.is_allowed() {
        return Ok(Json(AuthorizeResponse { allowed: true }));
    }

    Err(ApiError::permission_denied(
        decision
            .reason
            .unwrap_or_else(|| "request denied".to_string()),
    ))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new().route(AUTHORIZE_PATH, post(authorize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn body() -> AuthorizeRequest {
        AuthorizeRequest {
            system_url: "https://admin.example.com/".to_string(),
            service_id: "42".to_string(),
            access_token: "token".to_string(),
            credentials: CredentialsBody {
                user_key: Some("key".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_route_to_get_root() {
        let request = body().into_auth_request().unwrap();
        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "/");
        assert_eq!(request.identity.service.system_url, "https://admin.example.com");
        assert!(request.usage.is_none());
    }

    #[test]
    fn test_method_is_normalized() {
        let request = AuthorizeRequest {
            method: Some("post".to_string()),
            path: Some("/orders/7".to_string()),
            ..body()
        }
        .into_auth_request()
        .unwrap();
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/orders/7");
    }

    #[test]
    fn test_missing_service_id_is_rejected() {
        let err = AuthorizeRequest {
            service_id: "  ".to_string(),
            ..body()
        }
        .into_auth_request()
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingField);
        assert!(err.message.contains("service_id"));
    }

    #[test]
    fn test_app_id_credentials() {
        let credentials = CredentialsBody {
            app_id: Some("app".to_string()),
            app_key: Some("".to_string()),
            ..Default::default()
        }
        .into_credentials()
        .unwrap();
        assert_eq!(credentials, AppCredentials::app_id("app", None));
    }

    #[test]
    fn test_user_key_wins_over_app_id() {
        let credentials = CredentialsBody {
            user_key: Some("key".to_string()),
            app_id: Some("app".to_string()),
            app_key: Some("secret".to_string()),
        }
        .into_credentials()
        .unwrap();
        assert_eq!(credentials, AppCredentials::user_key("key"));
    }

    #[test]
    fn test_missing_credentials_are_rejected() {
        let err = CredentialsBody::default().into_credentials().unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingField);
    }

    #[test]
    fn test_request_deserializes_with_usage() {
        let body: AuthorizeRequest = serde_json::from_value(serde_json::json!({
            "system_url": "https://admin.example.com",
            "service_id": "42",
            "access_token": "token",
            "credentials": { "app_id": "app", "app_key": "secret" },
            "usage": { "hits": 2, "uploads": 1 }
        }))
        .unwrap();

        let request = body.into_auth_request().unwrap();
        let usage = request.usage.unwrap();
        assert_eq!(usage.get("hits"), 2);
        assert_eq!(usage.get("uploads"), 1);
    }
}
