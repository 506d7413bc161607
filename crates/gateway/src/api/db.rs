//! Store admin endpoints: stats, search, cleanup, backup.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use crate::api::api_error;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/ccsdk/db/stats
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn stats(State(state): State<AppState>) -> Response {
    match state.store.stats() {
        Ok(stats) => Json(serde_json::json!({ "stats": stats })).into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/ccsdk/db/search?q=&limit=
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default = "default_search_limit")]
    pub limit: u32,
}

fn default_search_limit() -> u32 {
    50
}

pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Response {
    let Some(q) = query.q.filter(|q| !q.is_empty()) else {
        return api_error(StatusCode::BAD_REQUEST, "missing query parameter: q");
    };

    match state.store.search_messages(&q, query.limit) {
        Ok(results) => Json(serde_json::json!({
            "results": results,
            "count": results.len(),
        }))
        .into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/ccsdk/db/cleanup
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct CleanupBody {
    #[serde(default = "default_cleanup_days")]
    pub days: u32,
}

fn default_cleanup_days() -> u32 {
    30
}

pub async fn cleanup(
    State(state): State<AppState>,
    body: Option<Json<CleanupBody>>,
) -> Response {
    let days = body.map(|Json(b)| b.days).unwrap_or(default_cleanup_days());
    match state.store.cleanup_old_sessions(days) {
        Ok(removed) => Json(serde_json::json!({
            "success": true,
            "removed": removed,
            "days": days,
        }))
        .into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/ccsdk/db/backup
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct BackupBody {
    #[serde(default)]
    pub path: Option<String>,
}

pub async fn backup(State(state): State<AppState>, body: Option<Json<BackupBody>>) -> Response {
    let path = body
        .and_then(|Json(b)| b.path)
        .unwrap_or_else(|| {
            format!(
                "./data/backups/ccsdk-{}.db",
                chrono::Utc::now().format("%Y%m%d-%H%M%S")
            )
        });

    match state.store.backup(std::path::Path::new(&path)) {
        Ok(()) => Json(serde_json::json!({
            "success": true,
            "path": path,
        }))
        .into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
