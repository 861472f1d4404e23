//! Capability Token Manager
//!
//! Issues a short-lived token scoped to one (pipeline, execution) pair and
//! makes sure it is deactivated once the execution is over. Tokens are
//! never deleted.

use chrono::{Duration, Utc};
use sluice_core::domain::execution::Execution;
use sluice_core::domain::token::Token;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

use super::error::{Result, ServiceError};
use crate::repository::TokenRepository;

pub struct TokenManager {
    repo: Arc<dyn TokenRepository>,
    ttl: Duration,
}

impl TokenManager {
    pub fn new(repo: Arc<dyn TokenRepository>, ttl: Duration) -> Self {
        Self { repo, ttl }
    }

    /// Issues an active token for the execution, valid for the configured TTL
    pub async fn request(&self, pipeline_id: &str, execution: &Execution) -> Result<Token> {
        self.request_with_ttl(pipeline_id, execution, self.ttl).await
    }

    pub async fn request_with_ttl(
        &self,
        pipeline_id: &str,
        execution: &Execution,
        ttl: Duration,
    ) -> Result<Token> {
        let now = Utc::now();
        let expires_at = now.checked_add_signed(ttl).ok_or_else(|| {
            ServiceError::Configuration(format!("Token lifetime {} is out of range", ttl))
        })?;
        let token = Token {
            id: Uuid::new_v4(),
            pipeline_id: pipeline_id.to_string(),
            execution_id: execution.id,
            expires_at,
            active: true,
            created_at: now,
        };

        self.repo.create(&token).await?;
        tracing::debug!("Issued token for {}", execution.ident());

        Ok(token)
    }

    pub async fn get(&self, token_id: Uuid) -> Result<Token> {
        self.repo
            .find_by_id(token_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Token {} not found", token_id)))
    }

    /// Deactivates the token; revoking twice is fine
    pub async fn revoke(&self, token_id: Uuid) -> Result<()> {
        if !self.repo.deactivate(token_id).await? {
            return Err(ServiceError::NotFound(format!(
                "Token {} not found",
                token_id
            )));
        }
        tracing::debug!("Revoked token {}", token_id);
        Ok(())
    }

    /// Runs `work` with a fresh token and revokes it afterwards
    ///
    /// The token is revoked whatever `work` returns. If `work` panics or the
    /// returned future is dropped before completion, the revoke is scheduled
    /// on the runtime instead.
    pub async fn transaction<F, Fut, T>(
        &self,
        pipeline_id: &str,
        execution: &Execution,
        work: F,
    ) -> Result<T>
    where
        F: FnOnce(Token) -> Fut,
        Fut: Future<Output = T>,
    {
        let token = self.request(pipeline_id, execution).await?;
        let mut guard = RevokeOnDrop {
            repo: Arc::clone(&self.repo),
            token_id: Some(token.id),
        };

        let output = work(token.clone()).await;

        guard.disarm();
        if let Err(e) = self.revoke(token.id).await {
            tracing::error!(
                "Failed to revoke token of {}: {}",
                execution.ident(),
                e
            );
        }

        Ok(output)
    }

    /// Checks that `token` grants access to `pipeline_id` right now
    pub async fn authorize(&self, token: &str, pipeline_id: &str) -> Result<Token> {
        let denied = || ServiceError::Authorization("Invalid or expired token".to_string());

        let token_id = Uuid::parse_str(token.trim()).map_err(|_| denied())?;
        let token = self.repo.find_by_id(token_id).await?.ok_or_else(denied)?;

        if !token.grants(pipeline_id, Utc::now()) {
            tracing::debug!(
                "Token {} refused for pipeline '{}' (owner '{}', active={})",
                token.id,
                pipeline_id,
                token.pipeline_id,
                token.active
            );
            return Err(denied());
        }

        Ok(token)
    }

    /// Deactivates every token left active by a previous process
    pub async fn deactivate_stale(&self) -> Result<u64> {
        let count = self.repo.deactivate_all().await?;
        if count > 0 {
            tracing::warn!("Deactivated {} stale token(s)", count);
        }
        Ok(count)
    }
}

/// Revokes the token when dropped while still armed
struct RevokeOnDrop {
    repo: Arc<dyn TokenRepository>,
    token_id: Option<Uuid>,
}

impl RevokeOnDrop {
    fn disarm(&mut self) {
        self.token_id = None;
    }
}

impl Drop for RevokeOnDrop {
    fn drop(&mut self) {
        let Some(token_id) = self.token_id.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let repo = Arc::clone(&self.repo);
                handle.spawn(async move {
                    match repo.deactivate(token_id).await {
                        Ok(_) => tracing::debug!("Revoked token {} after abort", token_id),
                        Err(e) => tracing::error!("Failed to revoke token {}: {}", token_id, e),
                    }
                });
            }
            Err(_) => {
                tracing::error!("No runtime to revoke token {}, it stays active", token_id);
            }
        }
    }
}
