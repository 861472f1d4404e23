//! Sluice Supervisor
//!
//! Worker backends and the dispatcher that routes pipeline runs to them.
//!
//! This crate contains:
//! - The `Executor` trait and the environment contract handed to scripts
//! - Built-in executors: `native` (local subprocess) and `docker-run`
//! - A closed factory mapping type tags to executor constructors
//! - Supervisor configuration loading (YAML)
//! - The `Dispatcher`, which selects a supervisor per pipeline

pub mod config;
pub mod dispatcher;
pub mod docker;
pub mod error;
pub mod executor;
pub mod factory;
pub mod native;

pub use dispatcher::{Dispatcher, SelectionStrategy, SupervisorDefinition, SupervisorHandle};
pub use error::SupervisorError;
pub use executor::{ExecutionRequest, ExecutionResult, Executor, ExecutorError};
pub use factory::ExecutorFactory;
