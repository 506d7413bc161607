//! Normalized engine events.
//!
//! The underlying engine speaks its own wire shapes; adapters map them to
//! this closed taxonomy. Anything that doesn't fit is dropped with a
//! logged warning rather than leaking an open-ended payload downstream.

use serde_json::Value;

/// One event in a streaming turn.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Engine lifecycle event. The first event of every turn is
    /// `subtype == "init"` and carries the engine session id used to
    /// resume later turns, plus model/cwd/tool metadata in `data`.
    System {
        subtype: String,
        session_id: Option<String>,
        data: Value,
    },

    /// One text segment of the assistant's reply.
    Assistant { text: String },

    /// The engine is invoking a tool.
    ToolUse {
        tool_name: String,
        tool_id: String,
        tool_input: Value,
    },

    /// Outcome of a tool invocation.
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },

    /// Terminal event: exactly one per turn.
    Result {
        /// `"success"` or an `"error_*"` discriminator.
        subtype: String,
        is_error: bool,
        result_text: Option<String>,
        total_cost_usd: Option<f64>,
        duration_ms: Option<u64>,
    },

    /// Echo of the user's prompt. The session absorbs these without
    /// re-broadcasting or persisting them.
    User { content: String },
}

impl EngineEvent {
    /// True for the event that ends a turn.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EngineEvent::Result { .. })
    }
}
