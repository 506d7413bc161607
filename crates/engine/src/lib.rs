//! Engine adapter: a uniform streaming interface over the external
//! code-assistant engine.
//!
//! The gateway never talks to the engine directly — it consumes
//! [`EngineEvent`]s from an [`EngineAdapter`]. The production adapter
//! ([`ClaudeCliAdapter`]) drives the `claude` CLI in `stream-json` mode;
//! tests substitute scripted fakes.

pub mod cli;
pub mod event;

use std::path::PathBuf;
use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use ccsdk_domain::{Config, PermissionMode, Result};

pub use cli::ClaudeCliAdapter;
pub use event::EngineEvent;

/// A finite sequence of engine events, ending with a terminal `Result`
/// event or an error.
pub type EngineStream = Pin<Box<dyn Stream<Item = Result<EngineEvent>> + Send>>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Options
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-turn engine options.
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Engine-issued token from a previous turn; resumes the conversation.
    pub resume_token: Option<String>,
    pub model: Option<String>,
    pub max_turns: Option<u32>,
    pub cwd: Option<PathBuf>,
    /// Empty = engine default tool set.
    pub allowed_tools: Vec<String>,
    pub system_prompt_suffix: Option<String>,
    pub permission_mode: PermissionMode,
    /// MCP server configuration, passed through opaquely.
    pub mcp_servers: Option<Value>,
}

impl EngineOptions {
    /// The gateway-wide defaults, before a resume token is attached.
    pub fn from_config(config: &Config) -> Self {
        Self {
            resume_token: None,
            model: Some(config.model.clone()),
            max_turns: Some(config.max_turns),
            cwd: Some(config.cwd.clone()),
            allowed_tools: Vec::new(),
            system_prompt_suffix: None,
            permission_mode: config.permission_mode,
            mcp_servers: None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter contract
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Starts streaming turns against the engine.
///
/// Implementations must terminate promptly when `cancel` fires (the
/// stream yields `Error::Cancelled`), surface underlying failures as
/// `Error::Engine`, and never retry silently.
#[async_trait]
pub trait EngineAdapter: Send + Sync {
    async fn stream(
        &self,
        prompt: &str,
        options: EngineOptions,
        cancel: CancellationToken,
    ) -> Result<EngineStream>;
}
