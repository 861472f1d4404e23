//! Execution API Handlers
//!
//! Webhook trigger, execution history and pipeline-to-pipeline triggers.

use axum::{
    Json,
    extract::{ConnectInfo, Path, Query, State},
    http::{Extensions, HeaderMap, HeaderName, StatusCode, header},
    response::IntoResponse,
};
use serde::Deserialize;
use sluice_core::domain::execution::Execution;
use sluice_core::dto::execution::ExecutionHistory;
use std::collections::BTreeMap;
use std::net::SocketAddr;

use super::AppState;
use super::error::{ApiError, ApiResult};
use crate::service::{Access, TriggerRequest};

/// Header carrying a communication token
pub const TOKEN_HEADER: &str = "token";

#[derive(Debug, Deserialize)]
pub struct SecretQuery {
    #[serde(default)]
    pub secret: String,
}

// =============================================================================
// Trigger Endpoints
// =============================================================================

/// POST /pipeline/{id}/execute?secret=
/// Run the pipeline with the request body as payload and return its log
pub async fn execute_pipeline(
    State(state): State<AppState>,
    Path(pipeline_id): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    extensions: Extensions,
    payload: String,
) -> ApiResult<impl IntoResponse> {
    let mut query = group_query(pairs);
    let secret = take_first(&mut query, "secret").unwrap_or_default();
    tracing::info!("Trigger received for pipeline: {}", pipeline_id);

    let request = TriggerRequest {
        pipeline_id,
        access: Access::Secret(secret),
        payload,
        invoked_by_ip: client_ip(&headers, &extensions),
        query,
        headers: forwarded_headers(&headers),
    };

    let execution = run_trigger(&state, request).await?;
    Ok(execution_response(execution))
}

/// GET /pipeline/{id}/execute?secret=
/// Recent executions of the pipeline
pub async fn execution_history(
    State(state): State<AppState>,
    Path(pipeline_id): Path<String>,
    Query(query): Query<SecretQuery>,
) -> ApiResult<Json<ExecutionHistory>> {
    tracing::debug!("Listing executions of pipeline: {}", pipeline_id);

    let history = state
        .triggers
        .history(&pipeline_id, &query.secret, state.history_limit)
        .await?;

    Ok(Json(history))
}

/// POST /pipeline/{id}/api/execute-other?pipeline_id=<target>
/// Trigger another pipeline from a running execution of `{id}`
pub async fn execute_other_pipeline(
    State(state): State<AppState>,
    Path(pipeline_id): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    extensions: Extensions,
    payload: String,
) -> ApiResult<impl IntoResponse> {
    let token = token_header(&headers)?;
    let mut query = group_query(pairs);
    let target = take_first(&mut query, "pipeline_id")
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::BadRequest("pipeline_id query parameter is required".into()))?;

    tracing::info!("Pipeline '{}' triggers pipeline '{}'", pipeline_id, target);

    let request = TriggerRequest {
        pipeline_id: target,
        access: Access::Delegated {
            token,
            context_pipeline_id: pipeline_id,
        },
        payload,
        invoked_by_ip: client_ip(&headers, &extensions),
        query,
        headers: forwarded_headers(&headers),
    };

    let execution = run_trigger(&state, request).await?;
    Ok(execution_response(execution))
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Runs the trigger on its own task so that a disconnecting client does not
/// cancel the execution
async fn run_trigger(state: &AppState, request: TriggerRequest) -> ApiResult<Execution> {
    let triggers = state.triggers.clone();
    let execution = tokio::spawn(async move { triggers.trigger(request).await })
        .await
        .map_err(|e| ApiError::InternalError {
            kind: "ExecutorError",
            message: format!("Execution task failed: {}", e),
        })??;

    Ok(execution)
}

/// Groups query pairs by name, keeping repeated values in request order
fn group_query(pairs: Vec<(String, String)>) -> BTreeMap<String, Vec<String>> {
    let mut query: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, value) in pairs {
        query.entry(key).or_default().push(value);
    }
    query
}

/// Removes `key` and returns its first value
fn take_first(query: &mut BTreeMap<String, Vec<String>>, key: &str) -> Option<String> {
    query.remove(key).and_then(|values| values.into_iter().next())
}

fn execution_response(execution: Execution) -> impl IntoResponse {
    let headers = [
        (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
        (
            HeaderName::from_static("x-execution-number"),
            execution.execution_number.to_string(),
        ),
        (
            HeaderName::from_static("x-execution-status"),
            execution.status.as_str().to_string(),
        ),
    ];

    (StatusCode::OK, headers, execution.log)
}

/// Reads the required `Token` header
pub(super) fn token_header(headers: &HeaderMap) -> ApiResult<String> {
    headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::Forbidden("Missing Token header".to_string()))
}

/// First `X-Forwarded-For` entry, else the peer address, else "unknown"
fn client_ip(headers: &HeaderMap, extensions: &Extensions) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Request headers handed to the script, minus the communication token
fn forwarded_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter(|(name, _)| name.as_str() != TOKEN_HEADER)
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}
