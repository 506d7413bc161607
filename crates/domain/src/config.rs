//! Gateway configuration, read from the environment at startup.
//!
//! Every knob has a default so the gateway runs with zero configuration;
//! `validate()` reports anything suspicious before the server binds.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Permission mode
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How the engine handles tool-permission prompts during a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PermissionMode {
    #[default]
    #[serde(rename = "default")]
    Default,
    #[serde(rename = "acceptEdits")]
    AcceptEdits,
    #[serde(rename = "bypassPermissions")]
    BypassPermissions,
    #[serde(rename = "plan")]
    Plan,
}

impl PermissionMode {
    /// The flag value the engine CLI expects.
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionMode::Default => "default",
            PermissionMode::AcceptEdits => "acceptEdits",
            PermissionMode::BypassPermissions => "bypassPermissions",
            PermissionMode::Plan => "plan",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "default" => Some(PermissionMode::Default),
            "acceptEdits" => Some(PermissionMode::AcceptEdits),
            "bypassPermissions" => Some(PermissionMode::BypassPermissions),
            "plan" => Some(PermissionMode::Plan),
            _ => None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Effective gateway configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address host.
    pub host: String,
    /// Bind address port (`SERVER_PORT`).
    pub port: u16,
    /// Default engine model (`MODEL`).
    pub model: String,
    /// Max agent turns per engine stream (`MAX_TURNS`).
    pub max_turns: u32,
    /// Working directory handed to the engine (`CWD`).
    pub cwd: PathBuf,
    /// Tool-permission mode (`PERMISSION_MODE`).
    pub permission_mode: PermissionMode,
    /// SQLite database path (`DB_PATH`).
    pub db_path: PathBuf,
    /// How long a zero-subscriber idle session stays in memory
    /// (`IDLE_GRACE_MS`).
    pub idle_grace: Duration,
    /// WebSocket read idle timeout (`WS_IDLE_TIMEOUT_S`).
    pub ws_idle_timeout: Duration,
    /// Pending-prompt queue capacity per session (`QUEUE_CAPACITY`).
    pub queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            model: "sonnet".into(),
            max_turns: 100,
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            permission_mode: PermissionMode::Default,
            db_path: PathBuf::from("./data/ccsdk.db"),
            idle_grace: Duration::from_millis(60_000),
            ws_idle_timeout: Duration::from_secs(120),
            queue_capacity: 8,
        }
    }
}

impl Config {
    /// Build a config from the process environment, falling back to
    /// defaults for anything unset or unparseable. Bad values are logged,
    /// not fatal — `validate()` is the place for hard errors.
    pub fn from_env() -> Self {
        let mut cfg = Config::default();

        if let Some(host) = read_env("SERVER_HOST") {
            cfg.host = host;
        }
        if let Some(port) = parse_env::<u16>("SERVER_PORT") {
            cfg.port = port;
        }
        if let Some(model) = read_env("MODEL") {
            cfg.model = model;
        }
        if let Some(max_turns) = parse_env::<u32>("MAX_TURNS") {
            cfg.max_turns = max_turns;
        }
        if let Some(cwd) = read_env("CWD") {
            cfg.cwd = PathBuf::from(cwd);
        }
        if let Some(mode) = read_env("PERMISSION_MODE") {
            match PermissionMode::parse(&mode) {
                Some(m) => cfg.permission_mode = m,
                None => tracing::warn!(
                    value = %mode,
                    "invalid PERMISSION_MODE, using \"default\""
                ),
            }
        }
        if let Some(path) = read_env("DB_PATH") {
            cfg.db_path = PathBuf::from(path);
        }
        if let Some(ms) = parse_env::<u64>("IDLE_GRACE_MS") {
            cfg.idle_grace = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_env::<u64>("WS_IDLE_TIMEOUT_S") {
            cfg.ws_idle_timeout = Duration::from_secs(secs);
        }
        if let Some(cap) = parse_env::<usize>("QUEUE_CAPACITY") {
            cfg.queue_capacity = cap;
        }

        cfg
    }

    /// Sanity-check the configuration. Returns human-readable issues;
    /// the caller decides which severities are fatal.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.queue_capacity == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "QUEUE_CAPACITY must be at least 1".into(),
            });
        }
        if self.max_turns == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "MAX_TURNS must be at least 1".into(),
            });
        }
        if !self.cwd.exists() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: format!("CWD {} does not exist", self.cwd.display()),
            });
        }
        if self.idle_grace < Duration::from_secs(1) {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: "IDLE_GRACE_MS below 1s — sessions will be reclaimed aggressively".into(),
            });
        }

        issues
    }
}

fn read_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = read_env(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "unparseable env value, using default");
            None
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation issues
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub message: String,
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}
