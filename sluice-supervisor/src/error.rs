//! Error types for supervisor configuration and routing

use thiserror::Error;

/// Errors raised while building the dispatcher or selecting a supervisor
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Configuration file unreadable or invalid
    #[error("Invalid supervisor configuration: {0}")]
    Configuration(String),

    /// Node declares a type tag no constructor is registered for
    #[error("'{0}' is not a recognized supervisor type")]
    UnknownType(String),

    /// Settings name a selection strategy that does not exist
    #[error("'{0}' is not a valid selection strategy")]
    UnknownStrategy(String),

    /// No supervisor can take the pipeline
    #[error("Routing error: {0}")]
    Routing(String),
}

impl SupervisorError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn routing(message: impl Into<String>) -> Self {
        Self::Routing(message.into())
    }

    /// Whether the error is a routing failure rather than a startup failure
    pub fn is_routing(&self) -> bool {
        matches!(self, Self::Routing(_))
    }
}

impl From<serde_yaml::Error> for SupervisorError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}
