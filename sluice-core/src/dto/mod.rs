//! Data Transfer Objects
//!
//! Request and response shapes exchanged between the orchestrator API and
//! its callers (webhooks, running scripts via the callback client).

pub mod execution;
pub mod lock;
