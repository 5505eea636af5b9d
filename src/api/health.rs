//! Liveness endpoints.

use axum::Json;
use serde_json::{json, Value};

/// GET / - Liveness payload.
pub async fn root() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Statuspage API is running"
    }))
}

/// GET /health - Health check endpoint.
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "UP" }))
}

/// GET /api - API liveness.
pub async fn api_index() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
