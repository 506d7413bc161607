use std::sync::Arc;

use ccsdk_domain::Config;
use ccsdk_engine::EngineAdapter;
use ccsdk_sessions::SessionHub;
use ccsdk_store::Database;

use crate::clients::ClientRegistry;

/// Shared application state passed to all API and WebSocket handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Database,
    pub hub: Arc<SessionHub>,
    pub clients: Arc<ClientRegistry>,
    /// Used directly only by the one-shot `/query` endpoint; turns go
    /// through the hub.
    pub engine: Arc<dyn EngineAdapter>,
}
