//! Lock Admission Controller
//!
//! Decides whether a pipeline run may start given the pipeline's locks and
//! the trigger payload. A non-expired lock blocks when it has no filters, or
//! when every filter it defines matches the payload:
//! - regexp: the expression matches anywhere in the payload
//! - schema: the payload is JSON and validates against the schema
//! - keywords: any keyword is a substring of the payload
//!
//! A lock whose filters cannot be evaluated is skipped, or treated as
//! blocking in strict mode.

use chrono::{DateTime, Utc};
use jsonschema::JSONSchema;
use regex::Regex;
use sluice_core::domain::lock::Lock;
use std::sync::Arc;

use super::error::Result;
use crate::repository::LockRepository;

/// Outcome of evaluating one lock against one payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Blocks,
    Passes,
    /// The lock could not be evaluated
    Skipped(String),
}

pub struct LockAdmissionController {
    repo: Arc<dyn LockRepository>,
    strict: bool,
}

impl LockAdmissionController {
    pub fn new(repo: Arc<dyn LockRepository>, strict: bool) -> Self {
        Self { repo, strict }
    }

    /// Whether a run of `pipeline_id` with `payload` must be refused
    pub async fn is_blocked(&self, pipeline_id: &str, payload: &str) -> Result<bool> {
        let locks = self.repo.list_for_pipeline(pipeline_id).await?;
        Ok(self.first_blocking(&locks, payload, Utc::now()).is_some())
    }

    fn first_blocking<'a>(
        &self,
        locks: &'a [Lock],
        payload: &str,
        now: DateTime<Utc>,
    ) -> Option<&'a Lock> {
        for lock in locks.iter().filter(|l| !l.is_expired(now)) {
            match evaluate(lock, payload) {
                Verdict::Blocks => {
                    tracing::info!(
                        "Pipeline '{}' blocked by lock '{}'",
                        lock.pipeline_id,
                        lock.lock_id
                    );
                    return Some(lock);
                }
                Verdict::Passes => {}
                Verdict::Skipped(reason) => {
                    tracing::warn!(
                        "Lock '{}' on pipeline '{}' cannot be evaluated: {}",
                        lock.lock_id,
                        lock.pipeline_id,
                        reason
                    );
                    if self.strict {
                        return Some(lock);
                    }
                }
            }
        }

        None
    }
}

/// Evaluates `lock` against `payload`, ignoring expiry
pub fn evaluate(lock: &Lock, payload: &str) -> Verdict {
    let configured = lock.filter_count();
    if configured == 0 {
        return Verdict::Blocks;
    }

    let mut hits = 0;

    if let Some(expression) = lock.regexp_filter() {
        match Regex::new(expression) {
            Ok(regex) if regex.is_match(payload) => hits += 1,
            Ok(_) => {}
            Err(e) => return Verdict::Skipped(format!("invalid regexp: {}", e)),
        }
    }

    if let Some(schema) = lock.schema_filter() {
        match schema_matches(schema, payload) {
            Ok(true) => hits += 1,
            Ok(false) => {}
            Err(reason) => return Verdict::Skipped(reason),
        }
    }

    if let Some(keywords) = lock.keywords_filter() {
        if keywords.iter().any(|k| payload.contains(k.as_str())) {
            hits += 1;
        }
    }

    if hits == configured {
        Verdict::Blocks
    } else {
        Verdict::Passes
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Validates the payload against the schema; `Err` when either cannot be processed
fn schema_matches(schema: &str, payload: &str) -> std::result::Result<bool, String> {
    let schema: serde_json::Value =
        serde_json::from_str(schema).map_err(|e| format!("schema is not JSON: {}", e))?;
    let instance: serde_json::Value =
        serde_json::from_str(payload).map_err(|e| format!("payload is not JSON: {}", e))?;
    let compiled =
        JSONSchema::compile(&schema).map_err(|e| format!("invalid schema: {}", e))?;

    Ok(compiled.is_valid(&instance))
}
