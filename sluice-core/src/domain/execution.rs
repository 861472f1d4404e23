//! Execution domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recorded run of a pipeline
///
/// Created in `InProgress` when a trigger is admitted and moved exactly once
/// to a terminal status. Executions are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: i64,
    pub pipeline_id: String,
    /// Per-pipeline sequence number, starting at 1
    pub execution_number: i64,
    pub invoked_by_ip: String,
    pub payload: String,
    pub log: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Execution {
    /// Identity used for sandbox naming, e.g. `pipe_deploy_exec_12`
    pub fn ident(&self) -> String {
        format!("pipe_{}_exec_{}", self.pipeline_id, self.execution_number)
    }

    /// Applies the terminal transition in memory
    pub fn mark_as_finished(&mut self, success: bool, log: impl Into<String>) {
        self.log = log.into();
        self.status = if success {
            ExecutionStatus::Success
        } else {
            ExecutionStatus::Failure
        };
        self.finished_at = Some(Utc::now());
    }
}

/// Execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionStatus {
    InProgress,
    Success,
    Failure,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::InProgress => "in-progress",
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failure => "failure",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::InProgress)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in-progress" => Ok(ExecutionStatus::InProgress),
            "success" => Ok(ExecutionStatus::Success),
            "failure" => Ok(ExecutionStatus::Failure),
            other => Err(format!("unknown execution status '{}'", other)),
        }
    }
}
