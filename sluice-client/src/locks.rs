//! Lock endpoints

use crate::CallbackClient;
use crate::error::{ClientError, Result};
use reqwest::Method;
use sluice_core::domain::lock::Lock;
use sluice_core::dto::lock::{DeleteLockResponse, LockPayload};
use std::future::Future;
use std::time::Duration;

/// What `with_lock` does when the lock is already held
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Poll every `poll` until the lock is released, for at most `timeout`
    Wait { timeout: Duration, poll: Duration },
    /// Give up immediately with `ClientError::Locked`
    Exit,
}

impl Default for LockMode {
    fn default() -> Self {
        LockMode::Wait {
            timeout: Duration::from_secs(5),
            poll: Duration::from_secs(1),
        }
    }
}

impl CallbackClient {
    // =============================================================================
    // Lock Administration
    // =============================================================================

    /// Create or update a lock on this pipeline
    pub async fn put_lock(&self, lock_id: &str, payload: &LockPayload) -> Result<Lock> {
        let response = self
            .request(Method::PUT, &["lock", lock_id])?
            .json(payload)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Get a lock of this pipeline
    pub async fn get_lock(&self, lock_id: &str) -> Result<Lock> {
        let response = self
            .request(Method::GET, &["lock", lock_id])?
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Whether the lock is currently stored; expired locks still count
    pub async fn lock_exists(&self, lock_id: &str) -> Result<bool> {
        match self.get_lock(lock_id).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Delete a lock of this pipeline; deleting a missing lock succeeds
    pub async fn delete_lock(&self, lock_id: &str) -> Result<DeleteLockResponse> {
        let response = self
            .request(Method::DELETE, &["lock", lock_id])?
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Runs `work` while holding `lock_id`
    ///
    /// The lock is created with `payload` once it is free and deleted when
    /// `work` completes.
    pub async fn with_lock<F, Fut, T>(
        &self,
        lock_id: &str,
        mode: LockMode,
        payload: LockPayload,
        work: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if self.lock_exists(lock_id).await? {
            match mode {
                LockMode::Exit => {
                    return Err(ClientError::Locked(format!(
                        "'{}' is held by another execution",
                        lock_id
                    )));
                }
                LockMode::Wait { timeout, poll } => {
                    self.wait_for_release(lock_id, timeout, poll).await?;
                }
            }
        }

        self.put_lock(lock_id, &payload).await?;
        tracing::debug!("Acquired lock '{}'", lock_id);

        let output = work().await;

        match self.delete_lock(lock_id).await {
            Ok(response) if response.was_deleted() => {
                tracing::debug!("Released lock '{}'", lock_id);
            }
            Ok(_) => tracing::warn!("Lock '{}' was already gone on release", lock_id),
            Err(e) => tracing::warn!("Failed to release lock '{}': {}", lock_id, e),
        }

        Ok(output)
    }

    async fn wait_for_release(&self, lock_id: &str, timeout: Duration, poll: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if tokio::time::Instant::now() >= deadline {
                return Err(ClientError::Locked(format!(
                    "'{}' was not released within {:?}",
                    lock_id, timeout
                )));
            }

            tokio::time::sleep(poll).await;

            if !self.lock_exists(lock_id).await? {
                return Ok(());
            }
        }
    }
}
