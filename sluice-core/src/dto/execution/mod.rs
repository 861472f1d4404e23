//! Execution DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::execution::{Execution, ExecutionStatus};

/// Summary of one execution, as listed in the history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub execution_number: i64,
    pub status: ExecutionStatus,
    pub invoked_by_ip: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<Execution> for ExecutionSummary {
    fn from(execution: Execution) -> Self {
        Self {
            execution_number: execution.execution_number,
            status: execution.status,
            invoked_by_ip: execution.invoked_by_ip,
            started_at: execution.started_at,
            finished_at: execution.finished_at,
        }
    }
}

/// Recent execution history of a pipeline, most recent first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionHistory {
    pub last_execution_number: i64,
    pub executions: Vec<ExecutionSummary>,
}
