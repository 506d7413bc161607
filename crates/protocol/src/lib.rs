//! Wire protocol: the JSON text frames exchanged over the gateway
//! WebSocket, and the session snapshot they carry.
//!
//! Clients send [`ClientFrame`]s; the gateway replies with
//! [`ServerFrame`]s. All timestamps on the wire are epoch milliseconds.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session snapshot
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Point-in-time view of an in-memory session, sent on subscribe and in
/// the `connected` greeting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    pub message_count: u64,
    pub is_active: bool,
    pub created_at: i64,
    pub last_activity: i64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inbound frames (client → gateway)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Commands a connected client may send.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    /// Submit a prompt. With no `sessionId`, a new session is created.
    #[serde(rename = "chat", rename_all = "camelCase")]
    Chat {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        #[serde(default)]
        new_conversation: bool,
    },

    /// Bind this connection to a session's event stream.
    #[serde(rename = "subscribe", rename_all = "camelCase")]
    Subscribe { session_id: String },

    /// Detach from a session's event stream.
    #[serde(rename = "unsubscribe", rename_all = "camelCase")]
    Unsubscribe { session_id: String },

    /// Abort the session's in-flight turn, if any.
    #[serde(rename = "cancel", rename_all = "camelCase")]
    Cancel { session_id: String },

    /// Request a gateway snapshot (sessions + live client count).
    #[serde(rename = "system_info")]
    SystemInfo,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outbound frames (gateway → client)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything the gateway pushes to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    /// First frame after the socket opens.
    #[serde(rename = "connected", rename_all = "camelCase")]
    Connected {
        message: String,
        available_sessions: Vec<SessionInfo>,
    },

    /// Snapshot sent on (auto-)subscribe.
    #[serde(rename = "session_info")]
    SessionInfoFrame { data: SessionInfo },

    #[serde(rename = "subscribed", rename_all = "camelCase")]
    Subscribed { session_id: String },

    #[serde(rename = "unsubscribed", rename_all = "camelCase")]
    Unsubscribed { session_id: String },

    /// One text segment of the assistant's reply.
    #[serde(rename = "assistant_message", rename_all = "camelCase")]
    AssistantMessage { content: String, session_id: String },

    /// The engine is invoking a tool.
    #[serde(rename = "tool_use", rename_all = "camelCase")]
    ToolUse {
        tool_name: String,
        tool_id: String,
        tool_input: Value,
        session_id: String,
    },

    /// Result of a tool invocation.
    #[serde(rename = "tool_result", rename_all = "camelCase")]
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
        session_id: String,
    },

    /// Engine system event (`init` carries model/tools/mode metadata).
    #[serde(rename = "system", rename_all = "camelCase")]
    System {
        subtype: String,
        session_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },

    /// Terminal event of a successful or failed turn.
    #[serde(rename = "result", rename_all = "camelCase")]
    Result {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cost: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        session_id: String,
    },

    /// Cancellation has been requested; the turn is winding down.
    #[serde(rename = "cancelling", rename_all = "camelCase")]
    Cancelling { session_id: String, message: String },

    /// Terminal event of a cancelled turn.
    #[serde(rename = "cancelled", rename_all = "camelCase")]
    Cancelled { session_id: String, message: String },

    /// Gateway snapshot reply to `system_info`.
    #[serde(rename = "system_info", rename_all = "camelCase")]
    SystemInfo {
        sessions: Vec<SessionInfo>,
        client_count: usize,
    },

    #[serde(rename = "error", rename_all = "camelCase")]
    Error {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
}

impl ServerFrame {
    /// Shorthand for an error frame without session context.
    pub fn error(message: impl Into<String>) -> Self {
        ServerFrame::Error {
            error: message.into(),
            session_id: None,
        }
    }
}
