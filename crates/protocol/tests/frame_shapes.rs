//! Wire-shape tests: every frame kind must serialize to the exact JSON the
//! browser client speaks, camelCase fields and all.

use ccsdk_protocol::{ClientFrame, ServerFrame, SessionInfo};
use serde_json::json;

fn info() -> SessionInfo {
    SessionInfo {
        id: "s-1".into(),
        message_count: 4,
        is_active: true,
        created_at: 1_700_000_000_000,
        last_activity: 1_700_000_005_000,
    }
}

#[test]
fn chat_frame_parses_with_optional_fields() {
    let frame: ClientFrame =
        serde_json::from_str(r#"{"type":"chat","content":"hi"}"#).unwrap();
    match frame {
        ClientFrame::Chat {
            content,
            session_id,
            new_conversation,
        } => {
            assert_eq!(content, "hi");
            assert!(session_id.is_none());
            assert!(!new_conversation);
        }
        other => panic!("unexpected frame: {other:?}"),
    }

    let frame: ClientFrame = serde_json::from_str(
        r#"{"type":"chat","content":"again","sessionId":"s-1","newConversation":true}"#,
    )
    .unwrap();
    match frame {
        ClientFrame::Chat {
            session_id,
            new_conversation,
            ..
        } => {
            assert_eq!(session_id.as_deref(), Some("s-1"));
            assert!(new_conversation);
        }
        other => panic!("unexpected frame: {other:?}"),
    }
}

#[test]
fn subscribe_and_cancel_use_camel_case_session_id() {
    for (raw, expect_sid) in [
        (r#"{"type":"subscribe","sessionId":"x"}"#, "x"),
        (r#"{"type":"unsubscribe","sessionId":"y"}"#, "y"),
        (r#"{"type":"cancel","sessionId":"z"}"#, "z"),
    ] {
        let frame: ClientFrame = serde_json::from_str(raw).unwrap();
        let sid = match frame {
            ClientFrame::Subscribe { session_id }
            | ClientFrame::Unsubscribe { session_id }
            | ClientFrame::Cancel { session_id } => session_id,
            other => panic!("unexpected frame: {other:?}"),
        };
        assert_eq!(sid, expect_sid);
    }
}

#[test]
fn system_info_request_has_no_payload() {
    let frame: ClientFrame = serde_json::from_str(r#"{"type":"system_info"}"#).unwrap();
    assert!(matches!(frame, ClientFrame::SystemInfo));
}

#[test]
fn unknown_frame_type_is_a_parse_error() {
    let err = serde_json::from_str::<ClientFrame>(r#"{"type":"dance"}"#);
    assert!(err.is_err());
}

#[test]
fn connected_frame_shape() {
    let frame = ServerFrame::Connected {
        message: "welcome".into(),
        available_sessions: vec![info()],
    };
    let value = serde_json::to_value(&frame).unwrap();
    assert_eq!(value["type"], "connected");
    assert_eq!(value["availableSessions"][0]["id"], "s-1");
    assert_eq!(value["availableSessions"][0]["messageCount"], 4);
    assert_eq!(value["availableSessions"][0]["isActive"], true);
    assert_eq!(
        value["availableSessions"][0]["createdAt"],
        1_700_000_000_000_i64
    );
}

#[test]
fn assistant_and_tool_frames_are_camel_case() {
    let value = serde_json::to_value(ServerFrame::ToolUse {
        tool_name: "Read".into(),
        tool_id: "t-1".into(),
        tool_input: json!({"path": "/tmp/x"}),
        session_id: "s-1".into(),
    })
    .unwrap();
    assert_eq!(value["type"], "tool_use");
    assert_eq!(value["toolName"], "Read");
    assert_eq!(value["toolId"], "t-1");
    assert_eq!(value["toolInput"]["path"], "/tmp/x");
    assert_eq!(value["sessionId"], "s-1");

    let value = serde_json::to_value(ServerFrame::ToolResult {
        tool_use_id: "t-1".into(),
        content: "ok".into(),
        is_error: false,
        session_id: "s-1".into(),
    })
    .unwrap();
    assert_eq!(value["type"], "tool_result");
    assert_eq!(value["toolUseId"], "t-1");
    assert_eq!(value["isError"], false);
}

#[test]
fn result_frame_omits_absent_fields() {
    let value = serde_json::to_value(ServerFrame::Result {
        success: true,
        result: Some("done".into()),
        cost: Some(0.012),
        duration: Some(2100),
        error: None,
        session_id: "s-1".into(),
    })
    .unwrap();
    assert_eq!(value["type"], "result");
    assert_eq!(value["success"], true);
    assert_eq!(value["cost"], 0.012);
    assert_eq!(value["duration"], 2100);
    assert!(value.get("error").is_none());
}

#[test]
fn cancel_lifecycle_frames() {
    let value = serde_json::to_value(ServerFrame::Cancelling {
        session_id: "s-1".into(),
        message: "cancelling current turn".into(),
    })
    .unwrap();
    assert_eq!(value["type"], "cancelling");

    let value = serde_json::to_value(ServerFrame::Cancelled {
        session_id: "s-1".into(),
        message: "turn cancelled".into(),
    })
    .unwrap();
    assert_eq!(value["type"], "cancelled");
    assert_eq!(value["sessionId"], "s-1");
}

#[test]
fn error_frame_roundtrip() {
    let frame = ServerFrame::error("Session not found");
    let raw = serde_json::to_string(&frame).unwrap();
    let back: ServerFrame = serde_json::from_str(&raw).unwrap();
    match back {
        ServerFrame::Error { error, session_id } => {
            assert_eq!(error, "Session not found");
            assert!(session_id.is_none());
        }
        other => panic!("unexpected frame: {other:?}"),
    }
}
