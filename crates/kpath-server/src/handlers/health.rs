//! Liveness endpoint

use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

/// GET /health - unauthenticated liveness probe
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now(),
    }))
}
