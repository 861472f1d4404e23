//! Token Repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sluice_core::domain::token::Token;
use sqlx::PgPool;
use uuid::Uuid;

#[async_trait]
pub trait TokenRepository: Send + Sync {
    async fn create(&self, token: &Token) -> Result<(), sqlx::Error>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Token>, sqlx::Error>;

    /// Sets `active = false`; returns false for unknown ids
    async fn deactivate(&self, id: Uuid) -> Result<bool, sqlx::Error>;

    /// Deactivates every active token, returning how many were touched
    async fn deactivate_all(&self) -> Result<u64, sqlx::Error>;
}

pub struct PgTokenRepository {
    pool: PgPool,
}

impl PgTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenRepository for PgTokenRepository {
    async fn create(&self, token: &Token) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO tokens (id, pipeline_id, execution_id, expires_at, active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(token.id)
        .bind(&token.pipeline_id)
        .bind(token.execution_id)
        .bind(token.expires_at)
        .bind(token.active)
        .bind(token.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Token>, sqlx::Error> {
        let row = sqlx::query_as::<_, TokenRow>(
            r#"
            SELECT id, pipeline_id, execution_id, expires_at, active, created_at
            FROM tokens
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn deactivate(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE tokens SET active = FALSE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn deactivate_all(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("UPDATE tokens SET active = FALSE WHERE active")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct TokenRow {
    id: Uuid,
    pipeline_id: String,
    execution_id: i64,
    expires_at: DateTime<Utc>,
    active: bool,
    created_at: DateTime<Utc>,
}

impl From<TokenRow> for Token {
    fn from(row: TokenRow) -> Self {
        Token {
            id: row.id,
            pipeline_id: row.pipeline_id,
            execution_id: row.execution_id,
            expires_at: row.expires_at,
            active: row.active,
            created_at: row.created_at,
        }
    }
}
