//! In-process orchestrator stand-in for client tests

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{post, put},
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use sluice_core::domain::lock::Lock;
use sluice_core::dto::lock::{DeleteLockResponse, LockPayload};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const TOKEN: &str = "tok";

#[derive(Default)]
pub struct MockState {
    pub locks: Mutex<HashMap<String, Lock>>,
    /// Lock ids in the order they were written
    pub writes: Mutex<Vec<String>>,
}

type Shared = Arc<MockState>;

/// Starts the stand-in and returns its base URL and state
pub async fn start() -> (String, Shared) {
    let state = Shared::default();
    let router = Router::new()
        .route(
            "/pipeline/{id}/api/lock/{lock_id}",
            put(put_lock).get(get_lock).delete(delete_lock),
        )
        .route("/pipeline/{id}/api/execute-other", post(execute_other))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (format!("http://{}", addr), state)
}

fn error(status: StatusCode, message: &str, kind: &str) -> Response {
    (status, Json(json!({ "error": message, "type": kind }))).into_response()
}

fn authorized(headers: &HeaderMap) -> Result<(), Response> {
    match headers.get("token").and_then(|v| v.to_str().ok()) {
        Some(TOKEN) => Ok(()),
        _ => Err(error(
            StatusCode::FORBIDDEN,
            "Invalid or expired token",
            "AuthorizationError",
        )),
    }
}

async fn put_lock(
    State(state): State<Shared>,
    Path((pipeline_id, lock_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(payload): Json<LockPayload>,
) -> Response {
    if let Err(denied) = authorized(&headers) {
        return denied;
    }

    let now = Utc::now();
    let keywords = payload
        .keywords
        .and_then(|k| serde_json::from_value(k).ok())
        .unwrap_or_default();
    let lock = Lock {
        lock_id: lock_id.clone(),
        pipeline_id,
        expires_at: payload.expires_at.unwrap_or(now + Duration::hours(2)),
        regexp: payload.regexp,
        schema: payload.schema,
        keywords,
        created_at: now,
        updated_at: now,
    };

    state.writes.lock().unwrap().push(lock_id.clone());
    state.locks.lock().unwrap().insert(lock_id, lock.clone());
    Json(lock).into_response()
}

async fn get_lock(
    State(state): State<Shared>,
    Path((_, lock_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if let Err(denied) = authorized(&headers) {
        return denied;
    }

    match state.locks.lock().unwrap().get(&lock_id) {
        Some(lock) => Json(lock.clone()).into_response(),
        None => error(StatusCode::NOT_FOUND, "Lock not found", "NotFoundError"),
    }
}

async fn delete_lock(
    State(state): State<Shared>,
    Path((_, lock_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if let Err(denied) = authorized(&headers) {
        return denied;
    }

    let removed = state.locks.lock().unwrap().remove(&lock_id).is_some();
    Json(DeleteLockResponse::new(removed)).into_response()
}

#[derive(Deserialize)]
struct Target {
    pipeline_id: Option<String>,
}

async fn execute_other(
    Path(_): Path<String>,
    Query(target): Query<Target>,
    headers: HeaderMap,
    payload: String,
) -> Response {
    if let Err(denied) = authorized(&headers) {
        return denied;
    }

    match target.pipeline_id.as_deref() {
        None => error(
            StatusCode::BAD_REQUEST,
            "pipeline_id query parameter is required",
            "ValidationError",
        ),
        Some("locked") => error(
            StatusCode::LOCKED,
            "Pipeline 'locked' is locked",
            "AdmissionBlocked",
        ),
        Some(target) => (
            StatusCode::OK,
            [
                ("x-execution-number", "7".to_string()),
                ("x-execution-status", "success".to_string()),
            ],
            format!("ran {}: {}", target, payload),
        )
            .into_response(),
    }
}
