//! In-memory registry of connected WebSocket clients.

use std::collections::HashMap;

use parking_lot::RwLock;

use ccsdk_sessions::ClientSink;

/// A connected client: identity, subscription state, and the channel to
/// its WebSocket writer task.
pub struct ConnectedClient {
    pub client_id: String,
    pub connected_at: i64,
    /// The one session this client is subscribed to, if any.
    pub current_session_id: Option<String>,
    pub sink: ClientSink,
}

/// Thread-safe registry of all live connections.
pub struct ClientRegistry {
    clients: RwLock<HashMap<String, ConnectedClient>>,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, client: ConnectedClient) {
        self.clients
            .write()
            .insert(client.client_id.clone(), client);
    }

    pub fn remove(&self, client_id: &str) -> bool {
        self.clients.write().remove(client_id).is_some()
    }

    pub fn count(&self) -> usize {
        self.clients.read().len()
    }

    pub fn sink(&self, client_id: &str) -> Option<ClientSink> {
        self.clients.read().get(client_id).map(|c| c.sink.clone())
    }

    pub fn current_session(&self, client_id: &str) -> Option<String> {
        self.clients
            .read()
            .get(client_id)
            .and_then(|c| c.current_session_id.clone())
    }

    pub fn set_session(&self, client_id: &str, session_id: Option<String>) {
        if let Some(client) = self.clients.write().get_mut(client_id) {
            client.current_session_id = session_id;
        }
    }
}
