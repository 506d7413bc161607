//! Session endpoints: live hub snapshots plus the persisted `/db` rows.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use crate::api::api_error;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/ccsdk/sessions (in-memory)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list_live(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.hub.list();
    Json(serde_json::json!({
        "sessions": sessions,
        "count": sessions.len(),
    }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/ccsdk/db/sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    50
}

pub async fn list_persisted(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Response {
    match state.store.list_sessions(query.limit, query.offset) {
        Ok(sessions) => Json(serde_json::json!({
            "sessions": sessions,
            "count": sessions.len(),
        }))
        .into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// GET /api/ccsdk/db/sessions/active
pub async fn list_active(State(state): State<AppState>) -> Response {
    match state.store.list_active_sessions() {
        Ok(sessions) => Json(serde_json::json!({
            "sessions": sessions,
            "count": sessions.len(),
        }))
        .into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// GET /api/ccsdk/db/sessions/:id
pub async fn get_persisted(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.store.get_session(&id) {
        Ok(Some(session)) => Json(serde_json::json!({ "session": session })).into_response(),
        Ok(None) => api_error(StatusCode::NOT_FOUND, "session not found"),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/ccsdk/db/sessions/:id/messages
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    #[serde(default = "default_messages_limit")]
    pub limit: u32,
}

fn default_messages_limit() -> u32 {
    100
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> Response {
    match state.store.list_messages(&id, query.limit) {
        Ok(messages) => Json(serde_json::json!({
            "messages": messages,
            "count": messages.len(),
        }))
        .into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DELETE /api/ccsdk/db/sessions/:id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Delete the row (messages cascade) and evict any in-memory state so a
/// deleted session cannot keep streaming.
pub async fn delete_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    state.hub.evict(&id);
    match state.store.delete_session(&id) {
        Ok(true) => Json(serde_json::json!({ "success": true })).into_response(),
        Ok(false) => api_error(StatusCode::NOT_FOUND, "session not found"),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
