use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde_json::json;

use crate::state::AppState;

/// Readiness probe for external health reporting.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "rag_loaded": state.rag.is_ready(),
        "uptime_seconds": (Utc::now() - state.started_at).num_seconds(),
    }))
}
