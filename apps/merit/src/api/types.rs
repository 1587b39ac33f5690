//! # API Request/Response Types
//!
//! JSON envelopes for the HTTP API and the mapping from workflow outcomes to
//! status codes.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use merit_core::{MeritError, Outcome};
use serde::{Deserialize, Serialize};

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// REQUESTS
// =============================================================================

/// Body of `POST /achievements/{id}/reject`.
///
/// A missing note deserializes as empty and is refused by validation, so the
/// caller sees the usual `validation_error` body rather than an extractor
/// rejection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub rejection_note: String,
}

// =============================================================================
// SUCCESS ENVELOPE
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Error body: `{"success": false, "code", "error", "field"?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub code: String,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ErrorResponse {
    pub fn new(code: &str, error: impl Into<String>) -> Self {
        Self {
            success: false,
            code: code.to_string(),
            error: error.into(),
            field: None,
        }
    }
}

/// HTTP status for each outcome class.
#[must_use]
pub const fn status_for(outcome: Outcome) -> StatusCode {
    match outcome {
        Outcome::ValidationError => StatusCode::BAD_REQUEST,
        Outcome::Forbidden => StatusCode::FORBIDDEN,
        Outcome::NotFound => StatusCode::NOT_FOUND,
        Outcome::InvalidState | Outcome::Conflict => StatusCode::CONFLICT,
        Outcome::Timeout => StatusCode::GATEWAY_TIMEOUT,
        Outcome::InternalFailure => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// A workflow error on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub MeritError);

impl From<MeritError> for ApiError {
    fn from(e: MeritError) -> Self {
        Self(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(MeritError::validation("body", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let outcome = self.0.outcome();
        // integrity and storage faults stay in the log
        let message = if outcome == Outcome::InternalFailure {
            tracing::error!(error = %self.0, "request failed");
            "internal failure".to_string()
        } else {
            self.0.to_string()
        };
        let body = ErrorResponse {
            field: self.0.field().map(str::to_string),
            ..ErrorResponse::new(outcome.as_str(), message)
        };
        (status_for(outcome), Json(body)).into_response()
    }
}

/// Missing or malformed caller identity.
#[derive(Debug)]
pub struct Unauthenticated(pub &'static str);

impl IntoResponse for Unauthenticated {
    fn into_response(self) -> Response {
        tracing::warn!(event = "auth_failure", reason = self.0, "caller identity rejected");
        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new("unauthenticated", self.0)),
        )
            .into_response()
    }
}

// =============================================================================
// TESTS
// =============================================================================
