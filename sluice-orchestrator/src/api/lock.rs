//! Lock API Handlers
//!
//! Lock administration for running scripts. The `Token` header must grant
//! access to `{id}`; the lock itself applies to `?pipeline_id=` when given.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::HeaderMap,
};
use serde::Deserialize;
use sluice_core::domain::lock::Lock;
use sluice_core::dto::lock::{DeleteLockResponse, LockPayload};

use super::AppState;
use super::error::{ApiError, ApiResult};
use super::execution::token_header;

#[derive(Debug, Deserialize)]
pub struct TargetQuery {
    pub pipeline_id: Option<String>,
}

impl TargetQuery {
    fn target<'a>(&'a self, context: &'a str) -> &'a str {
        self.pipeline_id
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(context)
    }
}

/// PUT /pipeline/{id}/api/lock/{lock_id}
/// Create or update a lock; an empty body creates an unconditional lock
pub async fn put_lock(
    State(state): State<AppState>,
    Path((pipeline_id, lock_id)): Path<(String, String)>,
    Query(query): Query<TargetQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Lock>> {
    authorize(&state, &headers, &pipeline_id).await?;

    let payload = if body.iter().all(u8::is_ascii_whitespace) {
        LockPayload::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid lock body: {}", e)))?
    };

    let lock = state
        .locks
        .put(query.target(&pipeline_id), &lock_id, payload)
        .await?;

    Ok(Json(lock))
}

/// GET /pipeline/{id}/api/lock/{lock_id}
pub async fn get_lock(
    State(state): State<AppState>,
    Path((pipeline_id, lock_id)): Path<(String, String)>,
    Query(query): Query<TargetQuery>,
    headers: HeaderMap,
) -> ApiResult<Json<Lock>> {
    authorize(&state, &headers, &pipeline_id).await?;

    let lock = state
        .locks
        .get(query.target(&pipeline_id), &lock_id)
        .await?;

    Ok(Json(lock))
}

/// DELETE /pipeline/{id}/api/lock/{lock_id}
pub async fn delete_lock(
    State(state): State<AppState>,
    Path((pipeline_id, lock_id)): Path<(String, String)>,
    Query(query): Query<TargetQuery>,
    headers: HeaderMap,
) -> ApiResult<Json<DeleteLockResponse>> {
    authorize(&state, &headers, &pipeline_id).await?;

    let deleted = state
        .locks
        .delete(query.target(&pipeline_id), &lock_id)
        .await?;

    Ok(Json(DeleteLockResponse::new(deleted)))
}

/// GET /locks
/// List all locks, or only those of `?pipeline_id=` when given
pub async fn list_locks(
    State(state): State<AppState>,
    Query(query): Query<TargetQuery>,
) -> ApiResult<Json<Vec<Lock>>> {
    let locks = match query.pipeline_id.as_deref().filter(|p| !p.is_empty()) {
        Some(pipeline_id) => {
            tracing::debug!("Listing locks of pipeline '{}'", pipeline_id);
            state.locks.list_for_pipeline(pipeline_id).await?
        }
        None => {
            tracing::debug!("Listing all locks");
            state.locks.list().await?
        }
    };

    Ok(Json(locks))
}

async fn authorize(state: &AppState, headers: &HeaderMap, pipeline_id: &str) -> ApiResult<()> {
    let token = token_header(headers)?;
    state.tokens.authorize(&token, pipeline_id).await?;
    Ok(())
}
