//! Defaults and validation behavior for the env-driven config.

use std::time::Duration;

use ccsdk_domain::config::{Config, ConfigSeverity, PermissionMode};

#[test]
fn defaults_match_documented_values() {
    let cfg = Config::default();
    assert_eq!(cfg.port, 8080);
    assert_eq!(cfg.model, "sonnet");
    assert_eq!(cfg.max_turns, 100);
    assert_eq!(cfg.permission_mode, PermissionMode::Default);
    assert_eq!(cfg.db_path.to_str().unwrap(), "./data/ccsdk.db");
    assert_eq!(cfg.idle_grace, Duration::from_millis(60_000));
    assert_eq!(cfg.ws_idle_timeout, Duration::from_secs(120));
    assert_eq!(cfg.queue_capacity, 8);
}

#[test]
fn default_config_validates_clean() {
    let cfg = Config::default();
    let errors: Vec<_> = cfg
        .validate()
        .into_iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .collect();
    assert!(errors.is_empty(), "unexpected errors: {errors:?}");
}

#[test]
fn zero_capacity_is_an_error() {
    let cfg = Config {
        queue_capacity: 0,
        ..Config::default()
    };
    assert!(cfg
        .validate()
        .iter()
        .any(|i| i.severity == ConfigSeverity::Error));
}

#[test]
fn permission_mode_serializes_camel_case() {
    let json = serde_json::to_string(&PermissionMode::AcceptEdits).unwrap();
    assert_eq!(json, r#""acceptEdits""#);
    let back: PermissionMode = serde_json::from_str(r#""bypassPermissions""#).unwrap();
    assert_eq!(back, PermissionMode::BypassPermissions);
}
