//! Execution Repository
//!
//! Persists executions and hands out per-pipeline execution numbers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sluice_core::domain::execution::{Execution, ExecutionStatus};
use sqlx::PgPool;

#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    /// Inserts a new in-progress execution numbered `max + 1` for its pipeline
    ///
    /// Reading the current maximum and inserting must be atomic with respect
    /// to other calls for the same pipeline.
    async fn create_next(
        &self,
        pipeline_id: &str,
        invoked_by_ip: &str,
        payload: &str,
    ) -> Result<Execution, sqlx::Error>;

    /// Stores the terminal state of `execution`
    ///
    /// Returns false when the stored record is missing or no longer in progress.
    async fn finish(&self, execution: &Execution) -> Result<bool, sqlx::Error>;

    /// Highest execution number of the pipeline, 0 if it never ran
    async fn last_number(&self, pipeline_id: &str) -> Result<i64, sqlx::Error>;

    /// Most recent executions of the pipeline, newest first
    async fn recent(&self, pipeline_id: &str, limit: i64) -> Result<Vec<Execution>, sqlx::Error>;

    /// Moves every in-progress execution to failure, appending `note` to its log
    async fn fail_in_progress(&self, note: &str) -> Result<u64, sqlx::Error>;
}

pub struct PgExecutionRepository {
    pool: PgPool,
}

impl PgExecutionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const EXECUTION_COLUMNS: &str = "id, pipeline_id, execution_number, invoked_by_ip, payload, log, status, started_at, finished_at";

#[async_trait]
impl ExecutionRepository for PgExecutionRepository {
    async fn create_next(
        &self,
        pipeline_id: &str,
        invoked_by_ip: &str,
        payload: &str,
    ) -> Result<Execution, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        // Serializes numbering per pipeline until commit
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(pipeline_id)
            .execute(&mut *tx)
            .await?;

        let (next,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(MAX(execution_number), 0) + 1 FROM executions WHERE pipeline_id = $1",
        )
        .bind(pipeline_id)
        .fetch_one(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, ExecutionRow>(&format!(
            r#"
            INSERT INTO executions (pipeline_id, execution_number, invoked_by_ip, payload, log, status, started_at)
            VALUES ($1, $2, $3, $4, '', $5, $6)
            RETURNING {}
            "#,
            EXECUTION_COLUMNS
        ))
        .bind(pipeline_id)
        .bind(next)
        .bind(invoked_by_ip)
        .bind(payload)
        .bind(ExecutionStatus::InProgress.as_str())
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(row.into())
    }

    async fn finish(&self, execution: &Execution) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE executions
            SET log = $1, status = $2, finished_at = $3
            WHERE id = $4 AND status = $5
            "#,
        )
        .bind(&execution.log)
        .bind(execution.status.as_str())
        .bind(execution.finished_at)
        .bind(execution.id)
        .bind(ExecutionStatus::InProgress.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn last_number(&self, pipeline_id: &str) -> Result<i64, sqlx::Error> {
        let (last,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(MAX(execution_number), 0) FROM executions WHERE pipeline_id = $1",
        )
        .bind(pipeline_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(last)
    }

    async fn recent(&self, pipeline_id: &str, limit: i64) -> Result<Vec<Execution>, sqlx::Error> {
        let rows = sqlx::query_as::<_, ExecutionRow>(&format!(
            r#"
            SELECT {}
            FROM executions
            WHERE pipeline_id = $1
            ORDER BY execution_number DESC
            LIMIT $2
            "#,
            EXECUTION_COLUMNS
        ))
        .bind(pipeline_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn fail_in_progress(&self, note: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE executions
            SET status = $1, finished_at = $2, log = log || $3
            WHERE status = $4
            "#,
        )
        .bind(ExecutionStatus::Failure.as_str())
        .bind(Utc::now())
        .bind(note)
        .bind(ExecutionStatus::InProgress.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct ExecutionRow {
    id: i64,
    pipeline_id: String,
    execution_number: i64,
    invoked_by_ip: String,
    payload: String,
    log: String,
    status: String,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl From<ExecutionRow> for Execution {
    fn from(row: ExecutionRow) -> Self {
        let status = row.status.parse().unwrap_or_else(|e| {
            tracing::warn!("Execution {}: {}, treating as failure", row.id, e);
            ExecutionStatus::Failure
        });

        Execution {
            id: row.id,
            pipeline_id: row.pipeline_id,
            execution_number: row.execution_number,
            invoked_by_ip: row.invoked_by_ip,
            payload: row.payload,
            log: row.log,
            status,
            started_at: row.started_at,
            finished_at: row.finished_at,
        }
    }
}
