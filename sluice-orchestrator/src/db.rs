use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Executions, numbered per pipeline
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS executions (
            id BIGSERIAL PRIMARY KEY,
            pipeline_id VARCHAR(255) NOT NULL,
            execution_number BIGINT NOT NULL,
            invoked_by_ip VARCHAR(64) NOT NULL,
            payload TEXT NOT NULL,
            log TEXT NOT NULL DEFAULT '',
            status VARCHAR(20) NOT NULL,
            started_at TIMESTAMPTZ NOT NULL,
            finished_at TIMESTAMPTZ,
            UNIQUE (pipeline_id, execution_number)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_executions_status ON executions(status)")
        .execute(pool)
        .await?;

    // Locks, keyed by (lock_id, pipeline_id)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS locks (
            lock_id VARCHAR(255) NOT NULL,
            pipeline_id VARCHAR(255) NOT NULL,
            expires_at TIMESTAMPTZ NOT NULL,
            regexp TEXT,
            json_schema TEXT,
            keywords TEXT[] NOT NULL DEFAULT '{}',
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            PRIMARY KEY (lock_id, pipeline_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_locks_pipeline_id ON locks(pipeline_id)")
        .execute(pool)
        .await?;

    // Tokens are deactivated, never deleted
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tokens (
            id UUID PRIMARY KEY,
            pipeline_id VARCHAR(255) NOT NULL,
            execution_id BIGINT NOT NULL REFERENCES executions(id),
            expires_at TIMESTAMPTZ NOT NULL,
            active BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tokens_active ON tokens(active)")
        .execute(pool)
        .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
