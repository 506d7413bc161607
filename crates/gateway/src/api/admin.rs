//! Health and configuration introspection endpoints.

use axum::extract::State;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

/// GET /api/ccsdk/health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let active = state
        .hub
        .list()
        .iter()
        .filter(|s| s.is_active)
        .count();
    Json(serde_json::json!({
        "status": "ok",
        "activeSessions": active,
        "timestamp": chrono::Utc::now().timestamp_millis(),
    }))
}

/// GET /api/ccsdk/config — the effective default engine options.
pub async fn engine_config(State(state): State<AppState>) -> impl IntoResponse {
    let config = &state.config;
    Json(serde_json::json!({
        "model": config.model,
        "maxTurns": config.max_turns,
        "cwd": config.cwd.display().to_string(),
        "permissionMode": config.permission_mode,
    }))
}
