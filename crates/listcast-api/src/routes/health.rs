//! Health check endpoints.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(ready))
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

async fn ready(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "ok": true, "busy": state.orchestrator.is_busy() }))
}
