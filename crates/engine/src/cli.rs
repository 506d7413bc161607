//! Production engine adapter: drives the `claude` CLI as a subprocess.
//!
//! Flow per turn:
//! 1. Spawn `claude -p <prompt> --output-format stream-json --verbose`
//!    (plus `--resume <token>` on continued conversations).
//! 2. Parse NDJSON stdout lines into raw CLI shapes and normalize them to
//!    [`EngineEvent`]s.
//! 3. On cancellation, kill the child and surface `Error::Cancelled`.
//!
//! The adapter never retries: a spawn failure, decode dead-end, or
//! non-zero exit without a terminal result surfaces as `Error::Engine`.

use std::process::Stdio;

use async_stream::try_stream;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use ccsdk_domain::{Error, PermissionMode, Result};

use crate::event::EngineEvent;
use crate::{EngineAdapter, EngineOptions, EngineStream};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Raw CLI stream-json shapes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CliEvent {
    /// Lifecycle event — `init` carries the CLI's own session_id, used
    /// for `--resume` on subsequent turns.
    System {
        subtype: Option<String>,
        session_id: Option<String>,
        #[serde(flatten)]
        rest: Map<String, Value>,
    },
    /// Assistant message: text and tool_use content blocks.
    Assistant { message: CliMessage },
    /// User-side message: prompt echoes and tool_result blocks.
    User { message: CliMessage },
    /// Terminal event of the turn.
    Result {
        subtype: Option<String>,
        is_error: Option<bool>,
        result: Option<String>,
        total_cost_usd: Option<f64>,
        duration_ms: Option<u64>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Debug)]
struct CliMessage {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: Value,
        #[serde(default)]
        is_error: Option<bool>,
    },
    #[serde(other)]
    Other,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Normalization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Map one NDJSON line to zero or more normalized events. A single
/// assistant line can carry several content blocks, hence the Vec.
fn normalize_line(line: &str) -> Vec<EngineEvent> {
    let raw: CliEvent = match serde_json::from_str(line) {
        Ok(ev) => ev,
        Err(e) => {
            tracing::warn!(error = %e, "dropping unparseable engine event");
            return Vec::new();
        }
    };

    match raw {
        CliEvent::System {
            subtype,
            session_id,
            rest,
        } => vec![EngineEvent::System {
            subtype: subtype.unwrap_or_default(),
            session_id,
            data: Value::Object(rest),
        }],
        CliEvent::Assistant { message } => message
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(EngineEvent::Assistant { text }),
                ContentBlock::ToolUse { id, name, input } => Some(EngineEvent::ToolUse {
                    tool_name: name,
                    tool_id: id,
                    tool_input: input,
                }),
                ContentBlock::ToolResult { .. } | ContentBlock::Other => None,
            })
            .collect(),
        CliEvent::User { message } => message
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => Some(EngineEvent::ToolResult {
                    tool_use_id,
                    content: stringify_content(&content),
                    is_error: is_error.unwrap_or(false),
                }),
                ContentBlock::Text { text } => Some(EngineEvent::User { content: text }),
                ContentBlock::ToolUse { .. } | ContentBlock::Other => None,
            })
            .collect(),
        CliEvent::Result {
            subtype,
            is_error,
            result,
            total_cost_usd,
            duration_ms,
        } => {
            let subtype = subtype.unwrap_or_else(|| "success".into());
            vec![EngineEvent::Result {
                is_error: is_error.unwrap_or_else(|| subtype != "success"),
                subtype,
                result_text: result,
                total_cost_usd,
                duration_ms,
            }]
        }
        CliEvent::Unknown => {
            tracing::warn!("dropping unknown engine event kind");
            Vec::new()
        }
    }
}

/// Tool results arrive as either a plain string or structured blocks;
/// flatten both to text for persistence and fan-out.
fn stringify_content(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Engine adapter backed by the `claude` CLI.
pub struct ClaudeCliAdapter {
    binary: String,
}

impl ClaudeCliAdapter {
    pub fn new() -> Self {
        Self {
            binary: "claude".into(),
        }
    }

    /// Override the binary path (tests, packaged installs).
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn build_command(&self, prompt: &str, options: &EngineOptions) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["-p", prompt, "--output-format", "stream-json", "--verbose"]);

        if let Some(ref token) = options.resume_token {
            cmd.args(["--resume", token]);
        }
        if let Some(ref model) = options.model {
            cmd.args(["--model", model]);
        }
        if let Some(max_turns) = options.max_turns {
            cmd.args(["--max-turns", &max_turns.to_string()]);
        }
        if options.permission_mode != PermissionMode::Default {
            cmd.args(["--permission-mode", options.permission_mode.as_str()]);
        }
        if !options.allowed_tools.is_empty() {
            cmd.args(["--allowed-tools", &options.allowed_tools.join(",")]);
        }
        if let Some(ref suffix) = options.system_prompt_suffix {
            cmd.args(["--append-system-prompt", suffix]);
        }
        if let Some(ref servers) = options.mcp_servers {
            cmd.args(["--mcp-config", &servers.to_string()]);
        }
        if let Some(ref cwd) = options.cwd {
            cmd.current_dir(cwd);
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl Default for ClaudeCliAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EngineAdapter for ClaudeCliAdapter {
    async fn stream(
        &self,
        prompt: &str,
        options: EngineOptions,
        cancel: CancellationToken,
    ) -> Result<EngineStream> {
        let mut child = self.build_command(prompt, &options).spawn().map_err(|e| {
            Error::Engine(format!(
                "failed to spawn {} — is it installed and on PATH? ({e})",
                self.binary
            ))
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Engine("engine stdout not captured".into()))?;

        // Drain stderr so the child never blocks on a full pipe.
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(target: "engine_stderr", "{line}");
                }
            });
        }

        let stream = try_stream! {
            let mut lines = BufReader::new(stdout).lines();
            let mut saw_result = false;

            'read: loop {
                // None = the cancellation token fired before the next line.
                let read = cancel.run_until_cancelled(lines.next_line()).await;
                let line = match read {
                    None => {
                        let _ = child.start_kill();
                        let _ = child.wait().await;
                        Err(Error::Cancelled)
                    }
                    Some(Ok(None)) => break 'read,
                    Some(Ok(Some(line))) => Ok(line),
                    Some(Err(e)) => {
                        Err(Error::Engine(format!("reading engine output: {e}")))
                    }
                }?;
                for event in normalize_line(&line) {
                    let terminal = event.is_terminal();
                    yield event;
                    if terminal {
                        saw_result = true;
                        break 'read;
                    }
                }
            }

            let status = child
                .wait()
                .await
                .map_err(|e| Error::Engine(format!("waiting for engine: {e}")))?;
            let finished: Result<()> = if saw_result {
                Ok(())
            } else {
                Err(Error::Engine(format!(
                    "engine exited ({status}) without a terminal result"
                )))
            };
            finished?;
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_line_carries_session_id_and_metadata() {
        let line = r#"{"type":"system","subtype":"init","session_id":"eng-1",
            "model":"sonnet","cwd":"/work","tools":["Read"],"permissionMode":"default"}"#;
        let events = normalize_line(line);
        assert_eq!(events.len(), 1);
        match &events[0] {
            EngineEvent::System {
                subtype,
                session_id,
                data,
            } => {
                assert_eq!(subtype, "init");
                assert_eq!(session_id.as_deref(), Some("eng-1"));
                assert_eq!(data["model"], "sonnet");
                assert_eq!(data["tools"][0], "Read");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn assistant_line_splits_text_and_tool_use_blocks() {
        let line = r#"{"type":"assistant","message":{"role":"assistant","content":[
            {"type":"text","text":"let me check"},
            {"type":"tool_use","id":"t-1","name":"Read","input":{"path":"a.rs"}}
        ]}}"#;
        let events = normalize_line(line);
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            EngineEvent::Assistant {
                text: "let me check".into()
            }
        );
        match &events[1] {
            EngineEvent::ToolUse {
                tool_name,
                tool_id,
                tool_input,
            } => {
                assert_eq!(tool_name, "Read");
                assert_eq!(tool_id, "t-1");
                assert_eq!(tool_input["path"], "a.rs");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn user_line_yields_tool_results() {
        let line = r#"{"type":"user","message":{"role":"user","content":[
            {"type":"tool_result","tool_use_id":"t-1","content":"fn main() {}","is_error":false}
        ]}}"#;
        let events = normalize_line(line);
        assert_eq!(
            events,
            vec![EngineEvent::ToolResult {
                tool_use_id: "t-1".into(),
                content: "fn main() {}".into(),
                is_error: false,
            }]
        );
    }

    #[test]
    fn structured_tool_result_content_is_flattened() {
        let line = r#"{"type":"user","message":{"content":[
            {"type":"tool_result","tool_use_id":"t-2",
             "content":[{"type":"text","text":"line one"},{"type":"text","text":"line two"}]}
        ]}}"#;
        let events = normalize_line(line);
        match &events[0] {
            EngineEvent::ToolResult { content, .. } => {
                assert_eq!(content, "line one\nline two");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn result_line_success() {
        let line = r#"{"type":"result","subtype":"success","is_error":false,
            "result":"done","total_cost_usd":0.042,"duration_ms":3100}"#;
        let events = normalize_line(line);
        match &events[0] {
            EngineEvent::Result {
                subtype,
                is_error,
                result_text,
                total_cost_usd,
                duration_ms,
            } => {
                assert_eq!(subtype, "success");
                assert!(!is_error);
                assert_eq!(result_text.as_deref(), Some("done"));
                assert_eq!(*total_cost_usd, Some(0.042));
                assert_eq!(*duration_ms, Some(3100));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(events[0].is_terminal());
    }

    #[test]
    fn result_line_error_subtype_implies_is_error() {
        let line = r#"{"type":"result","subtype":"error_max_turns"}"#;
        let events = normalize_line(line);
        match &events[0] {
            EngineEvent::Result {
                subtype, is_error, ..
            } => {
                assert_eq!(subtype, "error_max_turns");
                assert!(is_error);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_and_garbage_lines_are_dropped() {
        assert!(normalize_line(r#"{"type":"telemetry","x":1}"#).is_empty());
        assert!(normalize_line("not json at all").is_empty());
    }
}
