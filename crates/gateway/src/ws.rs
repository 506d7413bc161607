//! WebSocket endpoint for chat clients.
//!
//! Flow:
//! 1. Client connects to `/api/ccsdk/ws` and receives `connected` with a
//!    snapshot of in-memory sessions.
//! 2. Each inbound JSON text frame is decoded and dispatched
//!    (`chat` / `subscribe` / `unsubscribe` / `cancel` / `system_info`).
//! 3. Session events reach the client through its writer channel; a
//!    writer that falls behind is dropped by the session fan-out.
//! 4. On close (or read idle timeout) the client is unsubscribed and the
//!    hub starts the idle-reclamation clock.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;

use ccsdk_domain::Error;
use ccsdk_protocol::{ClientFrame, ServerFrame};
use ccsdk_sessions::Session;

use crate::clients::ConnectedClient;
use crate::state::AppState;

/// GET /api/ccsdk/ws — upgrade to WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Socket handler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sink, mut ws_stream) = socket.split();

    let client_id = uuid::Uuid::new_v4().to_string();
    let connected_at = chrono::Utc::now().timestamp_millis();

    // Channel for outbound frames: session fan-out and command replies
    // both go through here; the writer task owns the raw sink.
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerFrame>(64);

    state.clients.register(ConnectedClient {
        client_id: client_id.clone(),
        connected_at,
        current_session_id: None,
        sink: outbound_tx.clone(),
    });
    if let Err(e) = state.store.record_client_connect(&client_id, connected_at) {
        tracing::warn!(client_id, error = %e, "failed to persist client connect");
    }

    let _ = outbound_tx
        .send(ServerFrame::Connected {
            message: "connected to ccsdk gateway".into(),
            available_sessions: state.hub.list(),
        })
        .await;

    tracing::info!(client_id, "client connected");

    // Writer task: forwards outbound channel frames to the WS sink.
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if send_frame(&mut ws_sink, &frame).await.is_err() {
                break;
            }
        }
    });

    // Reader loop, bounded by the idle timeout.
    let idle_timeout = state.config.ws_idle_timeout;
    loop {
        let next = match tokio::time::timeout(idle_timeout, ws_stream.next()).await {
            Err(_) => {
                tracing::info!(client_id, "closing idle connection");
                break;
            }
            Ok(next) => next,
        };
        match next {
            Some(Ok(Message::Text(text))) => dispatch(&state, &client_id, &text).await,
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                // axum answers WS-level pings automatically.
            }
            Some(Ok(_)) => {}
            Some(Err(_)) => break,
        }
    }

    // Cleanup: detach everywhere, arm reclamation, drop the writer.
    state.hub.on_client_disconnect(&client_id);
    state.clients.remove(&client_id);
    if let Err(e) = state
        .store
        .record_client_disconnect(&client_id, chrono::Utc::now().timestamp_millis())
    {
        tracing::warn!(client_id, error = %e, "failed to persist client disconnect");
    }
    writer.abort();
    tracing::info!(client_id, "client disconnected");
}

async fn send_frame(
    sink: &mut (impl SinkExt<Message> + Unpin),
    frame: &ServerFrame,
) -> Result<(), ()> {
    let json = serde_json::to_string(frame).map_err(|_| ())?;
    sink.send(Message::Text(json)).await.map_err(|_| ())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Frame dispatch
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Decode and dispatch one inbound text frame. Decode failures are
/// reported to the sender; the connection stays open.
pub async fn dispatch(state: &AppState, client_id: &str, raw: &str) {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(_) => {
            reply(state, client_id, ServerFrame::error("Invalid JSON frame")).await;
            return;
        }
    };

    match serde_json::from_value::<ClientFrame>(value.clone()) {
        Ok(frame) => handle_frame(state, client_id, frame).await,
        Err(e) => {
            let known = matches!(
                value.get("type").and_then(Value::as_str),
                Some("chat" | "subscribe" | "unsubscribe" | "cancel" | "system_info")
            );
            let error = if known {
                format!("Malformed frame: {e}")
            } else {
                "Unknown message type".to_string()
            };
            reply(state, client_id, ServerFrame::error(error)).await;
        }
    }
}

/// Route one decoded command to the hub and sessions.
pub async fn handle_frame(state: &AppState, client_id: &str, frame: ClientFrame) {
    match frame {
        ClientFrame::Chat {
            content,
            session_id,
            new_conversation,
        } => {
            let session = match state.hub.get_or_create(session_id.as_deref()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!(client_id, error = %e, "failed to open session");
                    reply(
                        state,
                        client_id,
                        ServerFrame::error(format!("Failed to open session: {e}")),
                    )
                    .await;
                    return;
                }
            };

            if !session.is_subscribed(client_id) {
                switch_subscription(state, client_id, &session);
            }
            if new_conversation {
                session.end_conversation();
            }

            if let Err(e) = session.submit(&content) {
                let error = match e {
                    Error::Backpressure => "Prompt queue is full — try again shortly".into(),
                    other => other.to_string(),
                };
                reply(
                    state,
                    client_id,
                    ServerFrame::Error {
                        error,
                        session_id: Some(session.id().to_string()),
                    },
                )
                .await;
            }
        }

        ClientFrame::Subscribe { session_id } => match state.hub.get(&session_id) {
            Some(session) => {
                switch_subscription(state, client_id, &session);
                reply(state, client_id, ServerFrame::Subscribed { session_id }).await;
            }
            None => {
                reply(
                    state,
                    client_id,
                    ServerFrame::Error {
                        error: "Session not found".into(),
                        session_id: Some(session_id),
                    },
                )
                .await;
            }
        },

        ClientFrame::Unsubscribe { session_id } => {
            if let Some(session) = state.hub.get(&session_id) {
                session.unsubscribe(client_id);
                state.hub.schedule_idle_check(&session_id);
            }
            if state.clients.current_session(client_id).as_deref() == Some(&session_id) {
                state.clients.set_session(client_id, None);
                if let Err(e) = state.store.update_client_session(client_id, None) {
                    tracing::warn!(client_id, error = %e, "failed to persist unsubscribe");
                }
            }
            reply(state, client_id, ServerFrame::Unsubscribed { session_id }).await;
        }

        // Cancel on an unknown session is a silent no-op.
        ClientFrame::Cancel { session_id } => {
            if let Some(session) = state.hub.get(&session_id) {
                session.cancel();
            }
        }

        ClientFrame::SystemInfo => {
            reply(
                state,
                client_id,
                ServerFrame::SystemInfo {
                    sessions: state.hub.list(),
                    client_count: state.clients.count(),
                },
            )
            .await;
        }
    }
}

/// Bind the client to `session`, detaching it from any previous session
/// first (a client subscribes to at most one session at a time).
fn switch_subscription(state: &AppState, client_id: &str, session: &Session) {
    if let Some(previous) = state.clients.current_session(client_id) {
        if previous != session.id() {
            if let Some(old) = state.hub.get(&previous) {
                old.unsubscribe(client_id);
            }
            state.hub.schedule_idle_check(&previous);
        }
    }

    if let Some(sink) = state.clients.sink(client_id) {
        session.subscribe(client_id, sink);
    }
    state
        .clients
        .set_session(client_id, Some(session.id().to_string()));
    if let Err(e) = state
        .store
        .update_client_session(client_id, Some(session.id()))
    {
        tracing::warn!(client_id, error = %e, "failed to persist subscription");
    }
}

async fn reply(state: &AppState, client_id: &str, frame: ServerFrame) {
    if let Some(sink) = state.clients.sink(client_id) {
        let _ = sink.send(frame).await;
    }
}
