//! Token domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Capability issued to a single execution
///
/// Lets the running script call back into the orchestrator on behalf of its
/// pipeline. Tokens are deactivated, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub id: Uuid,
    pub pipeline_id: String,
    pub execution_id: i64,
    pub expires_at: DateTime<Utc>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Token {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whether the token grants access to `pipeline_id` at `now`
    pub fn grants(&self, pipeline_id: &str, now: DateTime<Utc>) -> bool {
        self.active && !self.is_expired(now) && self.pipeline_id == pipeline_id
    }
}
