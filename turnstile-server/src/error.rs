//! Error Types for the Turnstile adapter endpoint
//!
//! Every failure leaving the HTTP surface is an [`ApiError`] serialized as
//! `{"code": "...", "message": "..."}` with the status of its [`ErrorCode`].
//! A denial travels the same way with `PERMISSION_DENIED`, so the proxy only
//! has to look at the status code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use turnstile_core::AuthzError;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for adapter responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Request body is malformed or incomplete
    InvalidInput,

    /// Required field is missing from request
    MissingField,

    /// The backend (or a mapping rule) rejected the call
    PermissionDenied,

    /// No decision could be made; the proxy applies its own failure policy
    Unavailable,

    /// Internal server error
    InternalError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidInput | ErrorCode::MissingField => StatusCode::BAD_REQUEST,
            ErrorCode::PermissionDenied => StatusCode::FORBIDDEN,
            ErrorCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "Invalid request",
            ErrorCode::MissingField => "Required field is missing",
            ErrorCode::PermissionDenied => "Request denied",
            ErrorCode::Unavailable => "Authorization is temporarily unavailable",
            ErrorCode::InternalError => "Internal server error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::InvalidInput => "InvalidInput",
            ErrorCode::MissingField => "MissingField",
            ErrorCode::PermissionDenied => "PermissionDenied",
            ErrorCode::Unavailable => "Unavailable",
            ErrorCode::InternalError => "InternalError",
        };
        write!(f, "{}", name)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors
    // ========================================================================

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingField,
            format!("Required field '{}' is missing", field),
        )
    }

    pub fn permission_denied(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::PermissionDenied, reason)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unavailable, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

/// Manager errors never become denials: the caller sees `UNAVAILABLE`.
impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        match &err {
            AuthzError::ConfigUnavailable { service_id, .. }
            | AuthzError::BackendUnavailable { service_id, .. } => {
                ApiError::unavailable(err.to_string())
                    .with_details(serde_json::json!({ "service_id": service_id }))
            }
            AuthzError::CacheConstruction { .. } => ApiError::internal_error(err.to_string()),
        }
    }
}

/// Result type alias for adapter handlers.
pub type ApiResult<T> = Result<T, ApiError>;
