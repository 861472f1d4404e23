//! Orchestrator configuration
//!
//! Command line flags with environment variable fallbacks.

use clap::Parser;
use std::path::PathBuf;

/// Upper bound on token lifetime
pub const MAX_TOKEN_TTL_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Parser)]
#[command(name = "sluice-orchestrator")]
#[command(about = "Webhook-triggered pipeline orchestrator", long_about = None)]
pub struct Config {
    /// Address the HTTP API listens on
    #[arg(long, env = "SLUICE_BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: String,

    /// PostgreSQL connection string; without it state is kept in memory
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Directory holding pipeline declarations and scripts
    #[arg(long, env = "SLUICE_STORAGE_PATH", default_value = "./storage")]
    pub storage_path: PathBuf,

    /// Supervisor file (defaults to `<storage_path>/supervisor.yaml`)
    #[arg(long, env = "SLUICE_SUPERVISOR_CONFIG")]
    pub supervisor_config: Option<PathBuf>,

    /// Base URL running scripts use to call back into the orchestrator
    #[arg(long, env = "SLUICE_MASTER_URL", default_value = "http://localhost:8080")]
    pub master_url: String,

    /// Treat locks whose filters cannot be evaluated as blocking
    #[arg(long, env = "SLUICE_STRICT_LOCKS")]
    pub strict_locks: bool,

    /// Lifetime of execution tokens, in seconds
    #[arg(long, env = "SLUICE_TOKEN_TTL_SECS", default_value_t = 7200)]
    pub token_ttl_secs: u64,

    /// Number of executions returned by the history endpoint
    #[arg(long, env = "SLUICE_HISTORY_LIMIT", default_value_t = 20)]
    pub history_limit: i64,
}

impl Config {
    pub fn supervisor_config_path(&self) -> PathBuf {
        self.supervisor_config
            .clone()
            .unwrap_or_else(|| self.storage_path.join("supervisor.yaml"))
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.token_ttl_secs.min(MAX_TOKEN_TTL_SECS) as i64)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.is_empty() {
            anyhow::bail!("bind_addr cannot be empty");
        }

        if !self.master_url.starts_with("http://") && !self.master_url.starts_with("https://") {
            anyhow::bail!("master_url must start with http:// or https://");
        }

        if self.token_ttl_secs == 0 {
            anyhow::bail!("token_ttl_secs must be greater than 0");
        }

        if self.token_ttl_secs > MAX_TOKEN_TTL_SECS {
            anyhow::bail!(
                "token_ttl_secs must be at most {} (one year)",
                MAX_TOKEN_TTL_SECS
            );
        }

        if self.history_limit <= 0 {
            anyhow::bail!("history_limit must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            database_url: None,
            storage_path: PathBuf::from("./storage"),
            supervisor_config: None,
            master_url: "http://localhost:8080".to_string(),
            strict_locks: false,
            token_ttl_secs: 7200,
            history_limit: 20,
        }
    }
}
