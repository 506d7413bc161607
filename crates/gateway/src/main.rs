use std::sync::Arc;

use anyhow::Context;
use axum::http::Method;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

use ccsdk_domain::config::{Config, ConfigSeverity};
use ccsdk_engine::ClaudeCliAdapter;
use ccsdk_gateway::api;
use ccsdk_gateway::clients::ClientRegistry;
use ccsdk_gateway::state::AppState;
use ccsdk_sessions::SessionHub;
use ccsdk_store::Database;

#[derive(Parser)]
#[command(name = "ccsdk-gateway", about = "WebSocket gateway for code-assistant sessions")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Run the gateway server (default).
    Serve,
    /// Print the version and exit.
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            run_server().await
        }
        Some(Command::Version) => {
            println!("ccsdk-gateway {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Initialize structured JSON tracing (only for the `serve` command).
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,ccsdk_gateway=debug")),
        )
        .json()
        .init();
}

async fn run_server() -> anyhow::Result<()> {
    tracing::info!("ccsdk gateway starting");

    // ── Config (env-driven) ──────────────────────────────────────────
    let config = Arc::new(Config::from_env());
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Persistence store ────────────────────────────────────────────
    let store = Database::open(&config.db_path)
        .with_context(|| format!("opening database at {}", config.db_path.display()))?;

    // ── Engine adapter ───────────────────────────────────────────────
    let engine: Arc<dyn ccsdk_engine::EngineAdapter> = Arc::new(ClaudeCliAdapter::new());
    tracing::info!(
        model = %config.model,
        permission_mode = config.permission_mode.as_str(),
        "engine adapter ready"
    );

    // ── Session hub ──────────────────────────────────────────────────
    let hub = SessionHub::new(store.clone(), engine.clone(), config.clone());
    tracing::info!(
        idle_grace_ms = config.idle_grace.as_millis() as u64,
        queue_capacity = config.queue_capacity,
        "session hub ready"
    );

    // ── Client registry ──────────────────────────────────────────────
    let clients = Arc::new(ClientRegistry::new());

    let state = AppState {
        config: config.clone(),
        store,
        hub: hub.clone(),
        clients,
        engine,
    };

    // ── Periodic idle sweep (safety net behind scheduled checks) ─────
    {
        let hub = hub.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));
            loop {
                interval.tick().await;
                let reclaimed = hub.sweep_idle();
                if reclaimed > 0 {
                    tracing::info!(reclaimed, "idle sweep reclaimed sessions");
                }
            }
        });
    }

    // ── CORS (the browser dashboard is a cross-origin consumer) ──────
    let cors_layer = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    // ── Concurrency limit (backpressure protection) ─────────────────
    let max_concurrent = std::env::var("MAX_CONCURRENT_REQUESTS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(256);

    let app = api::router()
        .layer(cors_layer)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_concurrent))
        .with_state(state);

    // ── Bind ─────────────────────────────────────────────────────────
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    tracing::info!(addr = %addr, "ccsdk gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .context("axum server error")?;

    // Cancel running turns and persist final session state.
    hub.shutdown();

    Ok(())
}
