//! In-memory repositories
//!
//! Process-local stores used when no database is configured. Each store keeps
//! its state behind one mutex, which also makes execution numbering atomic.

use async_trait::async_trait;
use chrono::Utc;
use sluice_core::domain::execution::{Execution, ExecutionStatus};
use sluice_core::domain::lock::Lock;
use sluice_core::domain::token::Token;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{ExecutionRepository, LockRepository, TokenRepository};

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// =============================================================================
// Executions
// =============================================================================

#[derive(Default)]
pub struct InMemoryExecutionRepository {
    executions: Mutex<Vec<Execution>>,
}

impl InMemoryExecutionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionRepository for InMemoryExecutionRepository {
    async fn create_next(
        &self,
        pipeline_id: &str,
        invoked_by_ip: &str,
        payload: &str,
    ) -> Result<Execution, sqlx::Error> {
        let mut executions = guard(&self.executions);

        let last = executions
            .iter()
            .filter(|e| e.pipeline_id == pipeline_id)
            .map(|e| e.execution_number)
            .max()
            .unwrap_or(0);

        let execution = Execution {
            id: executions.len() as i64 + 1,
            pipeline_id: pipeline_id.to_string(),
            execution_number: last + 1,
            invoked_by_ip: invoked_by_ip.to_string(),
            payload: payload.to_string(),
            log: String::new(),
            status: ExecutionStatus::InProgress,
            started_at: Utc::now(),
            finished_at: None,
        };
        executions.push(execution.clone());

        Ok(execution)
    }

    async fn finish(&self, execution: &Execution) -> Result<bool, sqlx::Error> {
        let mut executions = guard(&self.executions);

        match executions
            .iter_mut()
            .find(|e| e.id == execution.id && e.status == ExecutionStatus::InProgress)
        {
            Some(stored) => {
                stored.log = execution.log.clone();
                stored.status = execution.status;
                stored.finished_at = execution.finished_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn last_number(&self, pipeline_id: &str) -> Result<i64, sqlx::Error> {
        Ok(guard(&self.executions)
            .iter()
            .filter(|e| e.pipeline_id == pipeline_id)
            .map(|e| e.execution_number)
            .max()
            .unwrap_or(0))
    }

    async fn recent(&self, pipeline_id: &str, limit: i64) -> Result<Vec<Execution>, sqlx::Error> {
        let mut recent: Vec<Execution> = guard(&self.executions)
            .iter()
            .filter(|e| e.pipeline_id == pipeline_id)
            .cloned()
            .collect();
        recent.sort_by(|a, b| b.execution_number.cmp(&a.execution_number));
        recent.truncate(limit.max(0) as usize);
        Ok(recent)
    }

    async fn fail_in_progress(&self, note: &str) -> Result<u64, sqlx::Error> {
        let mut executions = guard(&self.executions);
        let now = Utc::now();
        let mut count = 0;

        for execution in executions
            .iter_mut()
            .filter(|e| e.status == ExecutionStatus::InProgress)
        {
            execution.status = ExecutionStatus::Failure;
            execution.finished_at = Some(now);
            execution.log.push_str(note);
            count += 1;
        }

        Ok(count)
    }
}

// =============================================================================
// Locks
// =============================================================================

#[derive(Default)]
pub struct InMemoryLockRepository {
    locks: Mutex<Vec<Lock>>,
}

impl InMemoryLockRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockRepository for InMemoryLockRepository {
    async fn upsert(&self, lock: &Lock) -> Result<Lock, sqlx::Error> {
        let mut locks = guard(&self.locks);

        match locks
            .iter_mut()
            .find(|l| l.lock_id == lock.lock_id && l.pipeline_id == lock.pipeline_id)
        {
            Some(stored) => {
                let created_at = stored.created_at;
                *stored = Lock {
                    created_at,
                    ..lock.clone()
                };
                Ok(stored.clone())
            }
            None => {
                locks.push(lock.clone());
                Ok(lock.clone())
            }
        }
    }

    async fn find(&self, pipeline_id: &str, lock_id: &str) -> Result<Option<Lock>, sqlx::Error> {
        Ok(guard(&self.locks)
            .iter()
            .find(|l| l.lock_id == lock_id && l.pipeline_id == pipeline_id)
            .cloned())
    }

    async fn delete(&self, pipeline_id: &str, lock_id: &str) -> Result<bool, sqlx::Error> {
        let mut locks = guard(&self.locks);
        let before = locks.len();
        locks.retain(|l| !(l.lock_id == lock_id && l.pipeline_id == pipeline_id));
        Ok(locks.len() < before)
    }

    async fn list_all(&self) -> Result<Vec<Lock>, sqlx::Error> {
        Ok(guard(&self.locks).clone())
    }

    async fn list_for_pipeline(&self, pipeline_id: &str) -> Result<Vec<Lock>, sqlx::Error> {
        Ok(guard(&self.locks)
            .iter()
            .filter(|l| l.pipeline_id == pipeline_id)
            .cloned()
            .collect())
    }
}

// =============================================================================
// Tokens
// =============================================================================

#[derive(Default)]
pub struct InMemoryTokenRepository {
    tokens: Mutex<HashMap<Uuid, Token>>,
}

impl InMemoryTokenRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tokens still active
    pub fn active_count(&self) -> usize {
        guard(&self.tokens).values().filter(|t| t.active).count()
    }
}

#[async_trait]
impl TokenRepository for InMemoryTokenRepository {
    async fn create(&self, token: &Token) -> Result<(), sqlx::Error> {
        guard(&self.tokens).insert(token.id, token.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Token>, sqlx::Error> {
        Ok(guard(&self.tokens).get(&id).cloned())
    }

    async fn deactivate(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        match guard(&self.tokens).get_mut(&id) {
            Some(token) => {
                token.active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn deactivate_all(&self) -> Result<u64, sqlx::Error> {
        let mut count = 0;
        for token in guard(&self.tokens).values_mut().filter(|t| t.active) {
            token.active = false;
            count += 1;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_execution_numbers_are_per_pipeline() {
        let repo = InMemoryExecutionRepository::new();

        let a1 = repo.create_next("a", "10.0.0.1", "{}").await.unwrap();
        let a2 = repo.create_next("a", "10.0.0.1", "{}").await.unwrap();
        let b1 = repo.create_next("b", "10.0.0.1", "{}").await.unwrap();

        assert_eq!((a1.execution_number, a2.execution_number), (1, 2));
        assert_eq!(b1.execution_number, 1);
        assert_ne!(a2.id, b1.id);
        assert_eq!(repo.last_number("a").await.unwrap(), 2);
        assert_eq!(repo.last_number("c").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_finish_only_applies_once() {
        let repo = InMemoryExecutionRepository::new();
        let mut execution = repo.create_next("a", "ip", "{}").await.unwrap();

        execution.mark_as_finished(true, "ok");
        assert!(repo.finish(&execution).await.unwrap());

        execution.mark_as_finished(false, "again");
        assert!(!repo.finish(&execution).await.unwrap());

        let stored = repo.recent("a", 1).await.unwrap().remove(0);
        assert_eq!(stored.status, ExecutionStatus::Success);
        assert_eq!(stored.log, "ok");
    }

    #[tokio::test]
    async fn test_upsert_keeps_created_at() {
        let repo = InMemoryLockRepository::new();
        let created = Utc::now() - chrono::Duration::hours(1);
        let lock = Lock {
            lock_id: "l".to_string(),
            pipeline_id: "p".to_string(),
            expires_at: Utc::now(),
            regexp: None,
            schema: None,
            keywords: vec![],
            created_at: created,
            updated_at: created,
        };
        repo.upsert(&lock).await.unwrap();

        let updated = repo
            .upsert(&Lock {
                keywords: vec!["x".to_string()],
                created_at: Utc::now(),
                updated_at: Utc::now(),
                ..lock.clone()
            })
            .await
            .unwrap();

        assert_eq!(updated.created_at, created);
        assert_eq!(updated.keywords, vec!["x"]);
        assert_eq!(repo.list_all().await.unwrap().len(), 1);
        assert!(repo.delete("p", "l").await.unwrap());
        assert!(!repo.delete("p", "l").await.unwrap());
    }
}
