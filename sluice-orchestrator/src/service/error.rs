//! Service error type

use sluice_supervisor::{ExecutorError, SupervisorError};
use thiserror::Error;

use crate::registry::RegistryError;

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Authorization(String),

    #[error("Pipeline '{pipeline_id}' is locked")]
    AdmissionBlocked { pipeline_id: String },

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    Routing(String),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error("{0}")]
    Configuration(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ServiceError {
    /// Error kind reported to API callers
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "ValidationError",
            ServiceError::NotFound(_) => "NotFoundError",
            ServiceError::Authorization(_) => "AuthorizationError",
            ServiceError::AdmissionBlocked { .. } => "AdmissionBlocked",
            ServiceError::InvalidState(_) => "InvalidState",
            ServiceError::Routing(_) => "RoutingError",
            ServiceError::Executor(_) => "ExecutorError",
            ServiceError::Configuration(_) => "ConfigurationError",
            ServiceError::Database(_) => "DatabaseError",
        }
    }
}

impl From<SupervisorError> for ServiceError {
    fn from(err: SupervisorError) -> Self {
        match err {
            SupervisorError::Routing(msg) => ServiceError::Routing(msg),
            other => ServiceError::Configuration(other.to_string()),
        }
    }
}

impl From<RegistryError> for ServiceError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(id) => {
                ServiceError::NotFound(format!("Pipeline '{}' not found", id))
            }
            RegistryError::Io(e) => ServiceError::Configuration(format!("Storage error: {}", e)),
            RegistryError::Invalid(msg) => ServiceError::Configuration(msg),
        }
    }
}
