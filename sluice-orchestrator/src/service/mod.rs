//! Service Module
//!
//! Business logic layer for the orchestrator.
//! Services orchestrate between repositories and contain domain logic.

pub mod admission;
pub mod error;
pub mod ledger;
pub mod lock;
pub mod token;
pub mod trigger;

pub use admission::LockAdmissionController;
pub use error::{Result, ServiceError};
pub use ledger::ExecutionLedger;
pub use lock::LockService;
pub use token::TokenManager;
pub use trigger::{Access, TriggerRequest, TriggerService};
