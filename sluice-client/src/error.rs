//! Error types for the Sluice callback client

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when calling back into the orchestrator
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// API returned an error status code
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// The base URL cannot carry the callback path
    #[error("Invalid orchestrator URL: {0}")]
    InvalidUrl(String),

    /// Required environment variable is missing
    #[error("Environment variable {0} is not set")]
    MissingEnv(&'static str),

    /// The resource is held by another execution
    #[error("Resource is locked: {0}")]
    Locked(String),
}

impl ClientError {
    /// Create an API error from status code and response body
    ///
    /// The orchestrator answers `{"error": <message>, "type": <kind>}`; the
    /// message is extracted when the body has that shape.
    pub fn api_error(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or(body);

        Self::ApiError { status, message }
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ApiError { status: 404, .. })
    }

    /// Check if the orchestrator refused the run because of a lock
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked(_)) || matches!(self, Self::ApiError { status: 423, .. })
    }

    /// Check if this error is a client error (4xx status)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::ApiError { status, .. } if *status >= 400 && *status < 500)
    }

    /// Check if this error is a server error (5xx status)
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::ApiError { status, .. } if *status >= 500)
    }
}
