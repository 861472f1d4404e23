//! Lock Repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sluice_core::domain::lock::Lock;
use sqlx::PgPool;

#[async_trait]
pub trait LockRepository: Send + Sync {
    /// Creates or replaces the lock, keeping the original `created_at`
    async fn upsert(&self, lock: &Lock) -> Result<Lock, sqlx::Error>;

    async fn find(&self, pipeline_id: &str, lock_id: &str) -> Result<Option<Lock>, sqlx::Error>;

    /// Returns false when there was nothing to delete
    async fn delete(&self, pipeline_id: &str, lock_id: &str) -> Result<bool, sqlx::Error>;

    async fn list_all(&self) -> Result<Vec<Lock>, sqlx::Error>;

    async fn list_for_pipeline(&self, pipeline_id: &str) -> Result<Vec<Lock>, sqlx::Error>;
}

pub struct PgLockRepository {
    pool: PgPool,
}

impl PgLockRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LockRepository for PgLockRepository {
    async fn upsert(&self, lock: &Lock) -> Result<Lock, sqlx::Error> {
        let row = sqlx::query_as::<_, LockRow>(
            r#"
            INSERT INTO locks (lock_id, pipeline_id, expires_at, regexp, json_schema, keywords, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (lock_id, pipeline_id) DO UPDATE SET
                expires_at = EXCLUDED.expires_at,
                regexp = EXCLUDED.regexp,
                json_schema = EXCLUDED.json_schema,
                keywords = EXCLUDED.keywords,
                updated_at = EXCLUDED.updated_at
            RETURNING lock_id, pipeline_id, expires_at, regexp, json_schema, keywords, created_at, updated_at
            "#,
        )
        .bind(&lock.lock_id)
        .bind(&lock.pipeline_id)
        .bind(lock.expires_at)
        .bind(&lock.regexp)
        .bind(&lock.schema)
        .bind(&lock.keywords)
        .bind(lock.created_at)
        .bind(lock.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn find(&self, pipeline_id: &str, lock_id: &str) -> Result<Option<Lock>, sqlx::Error> {
        let row = sqlx::query_as::<_, LockRow>(
            r#"
            SELECT lock_id, pipeline_id, expires_at, regexp, json_schema, keywords, created_at, updated_at
            FROM locks
            WHERE pipeline_id = $1 AND lock_id = $2
            "#,
        )
        .bind(pipeline_id)
        .bind(lock_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn delete(&self, pipeline_id: &str, lock_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM locks WHERE pipeline_id = $1 AND lock_id = $2")
            .bind(pipeline_id)
            .bind(lock_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_all(&self) -> Result<Vec<Lock>, sqlx::Error> {
        let rows = sqlx::query_as::<_, LockRow>(
            r#"
            SELECT lock_id, pipeline_id, expires_at, regexp, json_schema, keywords, created_at, updated_at
            FROM locks
            ORDER BY pipeline_id, created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn list_for_pipeline(&self, pipeline_id: &str) -> Result<Vec<Lock>, sqlx::Error> {
        let rows = sqlx::query_as::<_, LockRow>(
            r#"
            SELECT lock_id, pipeline_id, expires_at, regexp, json_schema, keywords, created_at, updated_at
            FROM locks
            WHERE pipeline_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(pipeline_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct LockRow {
    lock_id: String,
    pipeline_id: String,
    expires_at: DateTime<Utc>,
    regexp: Option<String>,
    json_schema: Option<String>,
    keywords: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<LockRow> for Lock {
    fn from(row: LockRow) -> Self {
        Lock {
            lock_id: row.lock_id,
            pipeline_id: row.pipeline_id,
            expires_at: row.expires_at,
            regexp: row.regexp,
            schema: row.json_schema,
            keywords: row.keywords,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
