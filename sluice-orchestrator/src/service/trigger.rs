//! Trigger Service
//!
//! Runs a pipeline end to end:
//! registry lookup -> access check -> admission -> ledger begin ->
//! token transaction { supervisor selection -> execution } -> ledger finish.
//!
//! Routing and executor failures are recorded as a failed execution before
//! the error is returned.

use sluice_core::domain::execution::Execution;
use sluice_core::domain::pipeline::Pipeline;
use sluice_core::dto::execution::ExecutionHistory;
use sluice_supervisor::{Dispatcher, ExecutionRequest, ExecutionResult, ExecutorError};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::admission::LockAdmissionController;
use super::error::{Result, ServiceError};
use super::ledger::ExecutionLedger;
use super::token::TokenManager;
use crate::registry::PipelineRegistry;

/// How the caller proves it may run the pipeline
#[derive(Debug, Clone)]
pub enum Access {
    /// The pipeline's own secret
    Secret(String),
    /// A token issued to a running execution of `context_pipeline_id`
    Delegated {
        token: String,
        context_pipeline_id: String,
    },
}

#[derive(Debug, Clone)]
pub struct TriggerRequest {
    pub pipeline_id: String,
    pub access: Access,
    pub payload: String,
    pub invoked_by_ip: String,
    pub query: BTreeMap<String, Vec<String>>,
    pub headers: BTreeMap<String, String>,
}

pub struct TriggerService {
    registry: Arc<dyn PipelineRegistry>,
    admission: Arc<LockAdmissionController>,
    ledger: Arc<ExecutionLedger>,
    tokens: Arc<TokenManager>,
    dispatcher: Arc<Dispatcher>,
    master_url: String,
}

impl TriggerService {
    pub fn new(
        registry: Arc<dyn PipelineRegistry>,
        admission: Arc<LockAdmissionController>,
        ledger: Arc<ExecutionLedger>,
        tokens: Arc<TokenManager>,
        dispatcher: Arc<Dispatcher>,
        master_url: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            admission,
            ledger,
            tokens,
            dispatcher,
            master_url: master_url.into(),
        }
    }

    /// Runs the pipeline and returns the finished execution
    ///
    /// A script exiting non-zero is not an error: the execution is returned
    /// with a failure status.
    pub async fn trigger(&self, request: TriggerRequest) -> Result<Execution> {
        let pipeline = self.registry.find_by_id(&request.pipeline_id).await?;
        self.check_access(&pipeline, &request.access).await?;

        if self
            .admission
            .is_blocked(&pipeline.id, &request.payload)
            .await?
        {
            return Err(ServiceError::AdmissionBlocked {
                pipeline_id: pipeline.id,
            });
        }

        let execution = self
            .ledger
            .begin(&pipeline.id, &request.invoked_by_ip, &request.payload)
            .await?;

        let outcome = self
            .tokens
            .transaction(&pipeline.id, &execution, |token| {
                self.run(pipeline.clone(), execution.clone(), token.id.to_string(), request)
            })
            .await
            .and_then(|inner| inner);

        match outcome {
            Ok(result) => {
                self.ledger
                    .finish(execution, result.is_success(), result.output)
                    .await
            }
            Err(err) => {
                tracing::error!("Execution {} failed: {}", execution.ident(), err);
                if let Err(finish_err) = self.ledger.finish(execution, false, err.to_string()).await
                {
                    tracing::error!("Could not record failure: {}", finish_err);
                }
                Err(err)
            }
        }
    }

    /// Recent executions of a pipeline, guarded by its secret
    pub async fn history(
        &self,
        pipeline_id: &str,
        secret: &str,
        limit: i64,
    ) -> Result<ExecutionHistory> {
        let pipeline = self.registry.find_by_id(pipeline_id).await?;
        check_secret(&pipeline, secret)?;

        let last_execution_number = self.ledger.last_number(&pipeline.id).await?;
        let executions = self.ledger.recent(&pipeline.id, limit).await?;

        Ok(ExecutionHistory {
            last_execution_number,
            executions: executions.into_iter().map(Into::into).collect(),
        })
    }

    async fn check_access(&self, pipeline: &Pipeline, access: &Access) -> Result<()> {
        match access {
            Access::Secret(secret) => check_secret(pipeline, secret),
            Access::Delegated {
                token,
                context_pipeline_id,
            } => {
                let token = self.tokens.authorize(token, context_pipeline_id).await?;
                tracing::info!(
                    "Pipeline '{}' triggered by execution {} of '{}'",
                    pipeline.id,
                    token.execution_id,
                    context_pipeline_id
                );
                Ok(())
            }
        }
    }

    /// Selects a supervisor and runs the script on the blocking pool
    async fn run(
        &self,
        pipeline: Pipeline,
        execution: Execution,
        token: String,
        request: TriggerRequest,
    ) -> Result<ExecutionResult> {
        let handle = self.dispatcher.select(&pipeline)?;

        let execution_request = ExecutionRequest {
            execution,
            script: pipeline.script,
            payload: request.payload,
            token,
            query: request.query,
            headers: request.headers,
            config_payloads: pipeline.config_payloads,
            params: pipeline.params,
            master_url: self.master_url.clone(),
        };

        let dispatcher = Arc::clone(&self.dispatcher);
        let result = tokio::task::spawn_blocking(move || {
            dispatcher.execute(&handle, &execution_request)
        })
        .await
        .map_err(|e| ExecutorError::Aborted(e.to_string()))??;

        Ok(result)
    }
}

// =============================================================================
// Validation
// =============================================================================

fn check_secret(pipeline: &Pipeline, secret: &str) -> Result<()> {
    if pipeline.secret.is_empty() || pipeline.secret != secret {
        return Err(ServiceError::Authorization(format!(
            "Invalid secret for pipeline '{}'",
            pipeline.id
        )));
    }
    Ok(())
}
