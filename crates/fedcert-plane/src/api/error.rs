//! API error types and responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use fedcert_trust::TrustError;
use serde::Serialize;
use thiserror::Error;

use crate::error::PlaneError;

/// API error type
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Unknown subordinate: {0}")]
    UnknownSubordinate(String),

    #[error("Statement rejected: {0}")]
    InvalidStatement(String),

    #[error("Upstream fetch failed: {0}")]
    FetchFailed(String),
}

/// API error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone(), None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone(), None),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
                None,
            ),
            ApiError::UnknownSubordinate(sub) => (
                StatusCode::NOT_FOUND,
                "UNKNOWN_SUBORDINATE",
                format!("'{}' is not a registered subordinate", sub),
                Some(serde_json::json!({ "sub": sub })),
            ),
            ApiError::InvalidStatement(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "INVALID_STATEMENT",
                msg.clone(),
                None,
            ),
            ApiError::FetchFailed(msg) => (
                StatusCode::BAD_GATEWAY,
                "FETCH_FAILED",
                msg.clone(),
                None,
            ),
        };

        let body = ErrorResponse {
            error: message,
            code: code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

impl From<PlaneError> for ApiError {
    fn from(err: PlaneError) -> Self {
        match err {
            PlaneError::UnknownSubordinate(sub) => ApiError::UnknownSubordinate(sub),
            PlaneError::EntityNotFound(id) => ApiError::NotFound(id),
            PlaneError::Trust(TrustError::Fetch { what, message }) => {
                ApiError::FetchFailed(format!("{}: {}", what, message))
            }
            PlaneError::Trust(e @ TrustError::Verification { .. })
            | PlaneError::Trust(e @ TrustError::SubjectMismatch { .. }) => {
                ApiError::InvalidStatement(e.to_string())
            }
            PlaneError::Federation(fedcert_core::FederationError::InvalidIdentifier(id)) => {
                ApiError::BadRequest(format!("Invalid entity identifier '{}'", id))
            }
            PlaneError::Federation(fedcert_core::FederationError::StatementConstruction(msg)) => {
                ApiError::BadRequest(msg)
            }
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<fedcert_core::FederationError> for ApiError {
    fn from(err: fedcert_core::FederationError) -> Self {
        PlaneError::from(err).into()
    }
}
