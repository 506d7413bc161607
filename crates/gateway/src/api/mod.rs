pub mod admin;
pub mod db;
pub mod query;
pub mod sessions;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build a standardized JSON error response: `{ "error": "<message>" }`.
pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// Build the full API router under the `/api/ccsdk` prefix.
pub fn router() -> Router<AppState> {
    Router::new()
        // Live (in-memory) surface
        .route("/api/ccsdk/sessions", get(sessions::list_live))
        .route("/api/ccsdk/query", post(query::one_shot))
        .route("/api/ccsdk/config", get(admin::engine_config))
        .route("/api/ccsdk/health", get(admin::health))
        .route("/api/ccsdk/ws", get(crate::ws::ws_handler))
        // Persisted surface
        .route("/api/ccsdk/db/sessions", get(sessions::list_persisted))
        .route("/api/ccsdk/db/sessions/active", get(sessions::list_active))
        .route(
            "/api/ccsdk/db/sessions/:id",
            get(sessions::get_persisted).delete(sessions::delete_session),
        )
        .route(
            "/api/ccsdk/db/sessions/:id/messages",
            get(sessions::list_messages),
        )
        .route("/api/ccsdk/db/stats", get(db::stats))
        .route("/api/ccsdk/db/search", get(db::search))
        .route("/api/ccsdk/db/cleanup", post(db::cleanup))
        .route("/api/ccsdk/db/backup", post(db::backup))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
