//! Row types for the persistence store.

use std::collections::HashMap;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Discriminator of a persisted message row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    User,
    Assistant,
    System,
    ToolUse,
    ToolResult,
    Result,
    Error,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::User => "user",
            MessageType::Assistant => "assistant",
            MessageType::System => "system",
            MessageType::ToolUse => "tool_use",
            MessageType::ToolResult => "tool_result",
            MessageType::Result => "result",
            MessageType::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(MessageType::User),
            "assistant" => Some(MessageType::Assistant),
            "system" => Some(MessageType::System),
            "tool_use" => Some(MessageType::ToolUse),
            "tool_result" => Some(MessageType::ToolResult),
            "result" => Some(MessageType::Result),
            "error" => Some(MessageType::Error),
            _ => None,
        }
    }
}

impl ToSql for MessageType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for MessageType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        MessageType::parse(s).ok_or(FromSqlError::InvalidType)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Rows
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A persisted session row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub engine_session_id: Option<String>,
    pub created_at: i64,
    pub last_activity: i64,
    pub message_count: u64,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// A persisted message row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: i64,
    pub session_id: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Fields for a message about to be inserted.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub session_id: String,
    pub kind: MessageType,
    pub subtype: Option<String>,
    pub content: Option<String>,
    pub timestamp: i64,
    pub cost: Option<f64>,
    pub duration: Option<i64>,
    pub metadata: Option<Value>,
}

impl NewMessage {
    /// A message with only the required fields set.
    pub fn new(session_id: impl Into<String>, kind: MessageType, timestamp: i64) -> Self {
        Self {
            session_id: session_id.into(),
            kind,
            subtype: None,
            content: None,
            timestamp,
            cost: None,
            duration: None,
            metadata: None,
        }
    }
}

/// Partial update of a session row. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub engine_session_id: Option<String>,
    pub last_activity: Option<i64>,
    pub message_count: Option<u64>,
    pub is_active: Option<bool>,
    pub metadata: Option<Value>,
}

/// A persisted client row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRecord {
    pub id: String,
    pub connected_at: i64,
    pub disconnected_at: Option<i64>,
    pub current_session_id: Option<String>,
}

/// Aggregate counters for the admin stats endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total_sessions: u64,
    pub active_sessions: u64,
    pub total_messages: u64,
    pub total_cost: f64,
    pub messages_by_type: HashMap<String, u64>,
}
