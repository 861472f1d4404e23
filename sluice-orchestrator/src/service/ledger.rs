//! Execution Ledger
//!
//! Creates execution records, numbers them per pipeline and applies the
//! single terminal transition.

use sluice_core::domain::execution::Execution;
use std::sync::Arc;

use super::error::{Result, ServiceError};
use crate::repository::ExecutionRepository;

/// Appended to executions found in progress at startup
const INTERRUPTED_NOTE: &str = "\n[sluice] execution interrupted: the orchestrator restarted before it finished\n";

pub struct ExecutionLedger {
    repo: Arc<dyn ExecutionRepository>,
}

impl ExecutionLedger {
    pub fn new(repo: Arc<dyn ExecutionRepository>) -> Self {
        Self { repo }
    }

    /// Records a new in-progress execution with the next number for the pipeline
    pub async fn begin(
        &self,
        pipeline_id: &str,
        invoked_by_ip: &str,
        payload: &str,
    ) -> Result<Execution> {
        let execution = self
            .repo
            .create_next(pipeline_id, invoked_by_ip, payload)
            .await?;

        tracing::info!(
            "Execution {} started (invoked by {})",
            execution.ident(),
            invoked_by_ip
        );

        Ok(execution)
    }

    /// Moves the execution to SUCCESS or FAILURE and stores its log
    pub async fn finish(
        &self,
        mut execution: Execution,
        success: bool,
        log: impl Into<String>,
    ) -> Result<Execution> {
        if execution.status.is_terminal() {
            return Err(ServiceError::InvalidState(format!(
                "Execution {} is already {}",
                execution.ident(),
                execution.status
            )));
        }

        execution.mark_as_finished(success, log);

        if !self.repo.finish(&execution).await? {
            return Err(ServiceError::InvalidState(format!(
                "Execution {} is no longer in progress",
                execution.ident()
            )));
        }

        tracing::info!(
            "Execution {} finished: {}",
            execution.ident(),
            execution.status
        );

        Ok(execution)
    }

    pub async fn last_number(&self, pipeline_id: &str) -> Result<i64> {
        Ok(self.repo.last_number(pipeline_id).await?)
    }

    /// Up to `limit` executions of the pipeline, newest first
    pub async fn recent(&self, pipeline_id: &str, limit: i64) -> Result<Vec<Execution>> {
        if limit <= 0 {
            return Ok(vec![]);
        }
        Ok(self.repo.recent(pipeline_id, limit).await?)
    }

    /// Fails every execution left in progress by a previous process
    pub async fn reconcile_interrupted(&self) -> Result<u64> {
        let count = self.repo.fail_in_progress(INTERRUPTED_NOTE).await?;
        if count > 0 {
            tracing::warn!("Marked {} interrupted execution(s) as failed", count);
        }
        Ok(count)
    }
}
