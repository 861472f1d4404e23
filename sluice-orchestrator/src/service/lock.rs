//! Lock Service
//!
//! Administration of locks: create-or-update, lookup, delete and listing.
//! Filters are validated at write time so that malformed locks are rejected
//! before they reach the admission controller.

use chrono::{Duration, Utc};
use regex::Regex;
use sluice_core::domain::lock::Lock;
use sluice_core::dto::lock::LockPayload;
use std::sync::Arc;

use super::error::{Result, ServiceError};
use crate::repository::LockRepository;

/// Lifetime of a lock created without an explicit expiry
const DEFAULT_LOCK_TTL_HOURS: i64 = 2;

pub struct LockService {
    repo: Arc<dyn LockRepository>,
}

impl LockService {
    pub fn new(repo: Arc<dyn LockRepository>) -> Self {
        Self { repo }
    }

    /// Creates or updates the lock `(lock_id, pipeline_id)`
    pub async fn put(&self, pipeline_id: &str, lock_id: &str, payload: LockPayload) -> Result<Lock> {
        validate_identifier("pipeline_id", pipeline_id)?;
        validate_identifier("lock_id", lock_id)?;
        let keywords = parse_keywords(payload.keywords.as_ref())?;
        validate_regexp(payload.regexp.as_deref())?;
        validate_schema(payload.schema.as_deref())?;

        let now = Utc::now();
        let lock = Lock {
            lock_id: lock_id.to_string(),
            pipeline_id: pipeline_id.to_string(),
            expires_at: payload
                .expires_at
                .unwrap_or_else(|| now + Duration::hours(DEFAULT_LOCK_TTL_HOURS)),
            regexp: payload.regexp,
            schema: payload.schema,
            keywords,
            created_at: now,
            updated_at: now,
        };

        let stored = self.repo.upsert(&lock).await?;

        tracing::info!(
            "Lock '{}' set on pipeline '{}' until {} ({} filter(s))",
            stored.lock_id,
            stored.pipeline_id,
            stored.expires_at,
            stored.filter_count()
        );

        Ok(stored)
    }

    pub async fn get(&self, pipeline_id: &str, lock_id: &str) -> Result<Lock> {
        self.repo.find(pipeline_id, lock_id).await?.ok_or_else(|| {
            ServiceError::NotFound(format!(
                "Lock '{}' not found on pipeline '{}'",
                lock_id, pipeline_id
            ))
        })
    }

    /// Deletes the lock; false means it was already gone
    pub async fn delete(&self, pipeline_id: &str, lock_id: &str) -> Result<bool> {
        let deleted = self.repo.delete(pipeline_id, lock_id).await?;

        if deleted {
            tracing::info!("Lock '{}' removed from pipeline '{}'", lock_id, pipeline_id);
        } else {
            tracing::debug!(
                "Lock '{}' on pipeline '{}' was already deleted",
                lock_id,
                pipeline_id
            );
        }

        Ok(deleted)
    }

    pub async fn list(&self) -> Result<Vec<Lock>> {
        Ok(self.repo.list_all().await?)
    }

    pub async fn list_for_pipeline(&self, pipeline_id: &str) -> Result<Vec<Lock>> {
        Ok(self.repo.list_for_pipeline(pipeline_id).await?)
    }
}

// =============================================================================
// Validation
// =============================================================================

fn validate_identifier(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ServiceError::Validation(format!("{} cannot be empty", field)));
    }

    if value.len() > 255 {
        return Err(ServiceError::Validation(format!(
            "{} is too long (max 255 characters)",
            field
        )));
    }

    Ok(())
}

/// Accepts a missing/null value or an array of strings
fn parse_keywords(value: Option<&serde_json::Value>) -> Result<Vec<String>> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(vec![]),
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    ServiceError::Validation(format!("keywords must be strings, got {}", item))
                })
            })
            .collect(),
        Some(other) => Err(ServiceError::Validation(format!(
            "keywords must be a list of strings, got {}",
            other
        ))),
    }
}

fn validate_regexp(regexp: Option<&str>) -> Result<()> {
    match regexp {
        Some(expression) if !expression.is_empty() => Regex::new(expression)
            .map(|_| ())
            .map_err(|e| ServiceError::Validation(format!("Invalid regexp: {}", e))),
        _ => Ok(()),
    }
}

fn validate_schema(schema: Option<&str>) -> Result<()> {
    match schema {
        Some(text) if !text.trim().is_empty() => serde_json::from_str::<serde_json::Value>(text)
            .map(|_| ())
            .map_err(|e| ServiceError::Validation(format!("Schema is not valid JSON: {}", e))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryLockRepository;
    use serde_json::json;

    fn service() -> LockService {
        LockService::new(Arc::new(InMemoryLockRepository::new()))
    }

    #[tokio::test]
    async fn test_put_defaults_expiry() {
        let service = service();
        let before = Utc::now();

        let lock = service
            .put("deploy", "global", LockPayload::default())
            .await
            .unwrap();

        assert_eq!(lock.filter_count(), 0);
        assert!(lock.expires_at >= before + Duration::hours(2));
        assert!(lock.expires_at <= Utc::now() + Duration::hours(2));
    }

    #[tokio::test]
    async fn test_put_is_idempotent_upsert() {
        let service = service();
        let first = service
            .put("deploy", "tag", LockPayload::default().with_keywords(["a"]))
            .await
            .unwrap();
        let second = service
            .put("deploy", "tag", LockPayload::default().with_keywords(["b"]))
            .await
            .unwrap();

        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.keywords, vec!["b"]);
        assert_eq!(service.list().await.unwrap().len(), 1);
        assert_eq!(service.get("deploy", "tag").await.unwrap().keywords, vec!["b"]);
    }

    #[tokio::test]
    async fn test_put_rejects_invalid_filters() {
        let service = service();

        let non_string = LockPayload {
            keywords: Some(json!(["release", 5])),
            ..Default::default()
        };
        let not_a_list = LockPayload {
            keywords: Some(json!("release")),
            ..Default::default()
        };
        let bad_regexp = LockPayload::default().with_regexp("([unclosed");
        let bad_schema = LockPayload::default().with_schema("{not json");

        for payload in [non_string, not_a_list, bad_regexp, bad_schema] {
            let err = service.put("deploy", "l", payload).await.unwrap_err();
            assert!(matches!(err, ServiceError::Validation(_)));
        }
        assert!(service.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_null_keywords_are_absent() {
        let service = service();
        let payload = LockPayload {
            keywords: Some(serde_json::Value::Null),
            ..Default::default()
        };

        let lock = service.put("deploy", "l", payload).await.unwrap();
        assert!(lock.keywords.is_empty());
    }

    #[tokio::test]
    async fn test_get_and_delete() {
        let service = service();
        assert!(matches!(
            service.get("deploy", "missing").await.unwrap_err(),
            ServiceError::NotFound(_)
        ));

        service
            .put("deploy", "l", LockPayload::default())
            .await
            .unwrap();
        service
            .put("build", "l", LockPayload::default())
            .await
            .unwrap();
        assert_eq!(service.list_for_pipeline("deploy").await.unwrap().len(), 1);

        assert!(service.delete("deploy", "l").await.unwrap());
        assert!(!service.delete("deploy", "l").await.unwrap());
        assert_eq!(service.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_empty_identifiers() {
        let service = service();
        let err = service
            .put("deploy", " ", LockPayload::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }
}
