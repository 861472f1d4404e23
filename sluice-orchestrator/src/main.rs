use anyhow::Context;
use clap::Parser;
use sluice_supervisor::{Dispatcher, ExecutorFactory};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod config;
pub mod db;
pub mod registry;
pub mod repository;
pub mod service;

use config::Config;
use registry::FilePipelineRegistry;
use repository::{
    ExecutionRepository, InMemoryExecutionRepository, InMemoryLockRepository,
    InMemoryTokenRepository, LockRepository, PgExecutionRepository, PgLockRepository,
    PgTokenRepository, TokenRepository,
};
use service::{ExecutionLedger, LockAdmissionController, LockService, TokenManager, TriggerService};

struct Repositories {
    executions: Arc<dyn ExecutionRepository>,
    locks: Arc<dyn LockRepository>,
    tokens: Arc<dyn TokenRepository>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "sluice_orchestrator=debug,sluice_supervisor=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::parse();
    config.validate().context("Invalid configuration")?;

    tracing::info!("Starting Sluice Orchestrator...");

    let repos = connect(&config).await?;

    let dispatcher = Dispatcher::load(
        config.supervisor_config_path(),
        &ExecutorFactory::with_builtins(),
    )
    .with_context(|| {
        format!(
            "Failed to load supervisors from {}",
            config.supervisor_config_path().display()
        )
    })?;
    tracing::info!(
        "Loaded {} supervisor(s), strategy {:?}",
        dispatcher.definitions().len(),
        dispatcher.strategy()
    );

    let ledger = Arc::new(ExecutionLedger::new(repos.executions));
    let tokens = Arc::new(TokenManager::new(repos.tokens, config.token_ttl()));

    // Executions and tokens left behind by a previous process
    ledger
        .reconcile_interrupted()
        .await
        .context("Failed to reconcile interrupted executions")?;
    tokens
        .deactivate_stale()
        .await
        .context("Failed to deactivate stale tokens")?;

    let triggers = TriggerService::new(
        Arc::new(FilePipelineRegistry::new(&config.storage_path)),
        Arc::new(LockAdmissionController::new(
            repos.locks.clone(),
            config.strict_locks,
        )),
        ledger,
        tokens.clone(),
        Arc::new(dispatcher),
        config.master_url.clone(),
    );

    // Build router with all API endpoints
    let app = api::create_router(api::AppState {
        triggers: Arc::new(triggers),
        locks: Arc::new(LockService::new(repos.locks)),
        tokens,
        history_limit: config.history_limit,
    });

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}

/// PostgreSQL repositories when a database is configured, in-memory otherwise
async fn connect(config: &Config) -> anyhow::Result<Repositories> {
    let Some(database_url) = &config.database_url else {
        tracing::warn!("DATABASE_URL not set, state is kept in memory");
        return Ok(Repositories {
            executions: Arc::new(InMemoryExecutionRepository::new()),
            locks: Arc::new(InMemoryLockRepository::new()),
            tokens: Arc::new(InMemoryTokenRepository::new()),
        });
    };

    tracing::info!("Connecting to database...");

    // Create database connection pool
    let pool = db::create_pool(database_url)
        .await
        .context("Failed to create database pool")?;

    tracing::info!("Database connection pool created");

    // Run migrations
    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    Ok(Repositories {
        executions: Arc::new(PgExecutionRepository::new(pool.clone())),
        locks: Arc::new(PgLockRepository::new(pool.clone())),
        tokens: Arc::new(PgTokenRepository::new(pool)),
    })
}
