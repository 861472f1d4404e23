//! Core domain types
//!
//! These types are shared between the orchestrator (which persists them), the
//! supervisor crate (which runs executions) and the callback client.

pub mod execution;
pub mod lock;
pub mod pipeline;
pub mod token;
