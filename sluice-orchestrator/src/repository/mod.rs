//! Repository Module
//!
//! Data access layer for the orchestrator. Every repository is a trait with a
//! PostgreSQL implementation and an in-memory one (used when no database is
//! configured, and by the tests).

mod execution;
mod lock;
mod memory;
mod token;

// Re-export traits
pub use execution::ExecutionRepository;
pub use lock::LockRepository;
pub use token::TokenRepository;

// Re-export implementations
pub use execution::PgExecutionRepository;
pub use lock::PgLockRepository;
pub use memory::{InMemoryExecutionRepository, InMemoryLockRepository, InMemoryTokenRepository};
pub use token::PgTokenRepository;
