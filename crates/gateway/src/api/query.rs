//! One-shot query endpoint: run a single engine turn outside any session
//! and return the aggregated result.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use futures_util::StreamExt;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use ccsdk_engine::{EngineEvent, EngineOptions};

use crate::api::api_error;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct QueryBody {
    #[serde(default)]
    pub prompt: Option<String>,
    /// Optional model override for this query only.
    #[serde(default)]
    pub model: Option<String>,
}

/// POST /api/ccsdk/query
pub async fn one_shot(State(state): State<AppState>, Json(body): Json<QueryBody>) -> Response {
    let Some(prompt) = body.prompt.filter(|p| !p.is_empty()) else {
        return api_error(StatusCode::BAD_REQUEST, "missing required field: prompt");
    };

    let mut options = EngineOptions::from_config(&state.config);
    if body.model.is_some() {
        options.model = body.model;
    }

    let cancel = CancellationToken::new();
    let mut stream = match state.engine.stream(&prompt, options, cancel).await {
        Ok(s) => s,
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    let mut text = String::new();
    let mut success = true;
    let mut result_text = None;
    let mut cost = None;
    let mut duration = None;
    let mut error = None;

    while let Some(next) = stream.next().await {
        match next {
            Ok(EngineEvent::Assistant { text: segment }) => text.push_str(&segment),
            Ok(EngineEvent::Result {
                subtype,
                is_error,
                result_text: rt,
                total_cost_usd,
                duration_ms,
            }) => {
                success = !is_error;
                result_text = rt;
                cost = total_cost_usd;
                duration = duration_ms;
                if is_error {
                    error = Some(subtype);
                }
                break;
            }
            Ok(_) => {}
            Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        }
    }

    Json(serde_json::json!({
        "success": success,
        "result": result_text.unwrap_or(text),
        "cost": cost,
        "duration": duration,
        "error": error,
    }))
    .into_response()
}
