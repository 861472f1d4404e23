//! API Error Handling
//!
//! Unified error types and conversion for API responses.
//! Every error is rendered as `{"error": <message>, "type": <kind>}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::service::ServiceError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Forbidden(String),
    Locked(String),
    Conflict(String),
    DatabaseError(sqlx::Error),
    InternalError { kind: &'static str, message: String },
}

impl ApiError {
    fn kind(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NotFoundError",
            ApiError::BadRequest(_) => "ValidationError",
            ApiError::Forbidden(_) => "AuthorizationError",
            ApiError::Locked(_) => "AdmissionBlocked",
            ApiError::Conflict(_) => "InvalidState",
            ApiError::DatabaseError(_) => "DatabaseError",
            ApiError::InternalError { kind, .. } => *kind,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Locked(msg) => (StatusCode::LOCKED, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::DatabaseError(err) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::InternalError { message, .. } => {
                tracing::error!("Internal error: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };

        (
            status,
            Json(serde_json::json!({ "error": message, "type": kind })),
        )
            .into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let kind = err.kind();
        match err {
            ServiceError::Validation(msg) => ApiError::BadRequest(msg),
            ServiceError::NotFound(msg) => ApiError::NotFound(msg),
            ServiceError::Authorization(msg) => ApiError::Forbidden(msg),
            ServiceError::InvalidState(msg) => ApiError::Conflict(msg),
            ServiceError::Database(e) => ApiError::DatabaseError(e),
            blocked @ ServiceError::AdmissionBlocked { .. } => {
                ApiError::Locked(blocked.to_string())
            }
            other => ApiError::InternalError {
                kind,
                message: other.to_string(),
            },
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
