//! Health Check API Handler
//!
//! Simple health check endpoint for monitoring.

use axum::Json;
use serde_json::{Value, json};

/// GET /health
/// Health check endpoint
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "OK",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
