//! Process-wide session registry: creation, lookup, idle reclamation,
//! shutdown.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use ccsdk_domain::{Config, Result};
use ccsdk_engine::EngineAdapter;
use ccsdk_protocol::SessionInfo;
use ccsdk_store::Database;

use crate::now_ms;
use crate::session::Session;

/// Owns every in-memory session. Sessions are created on first reference
/// and reclaimed after the idle grace period with no subscribers and no
/// in-flight turn; their persisted rows survive reclamation.
pub struct SessionHub {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    store: Database,
    engine: Arc<dyn EngineAdapter>,
    config: Arc<Config>,
}

impl SessionHub {
    pub fn new(store: Database, engine: Arc<dyn EngineAdapter>, config: Arc<Config>) -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            store,
            engine,
            config,
        })
    }

    /// Look up a session, or create one under `id` (freshly generated
    /// when absent). Creation is race-free: at most one session per id.
    /// An id whose row survives in the store is rehydrated, so engine
    /// resumability outlives reclamation.
    pub fn get_or_create(&self, id: Option<&str>) -> Result<Arc<Session>> {
        if let Some(id) = id {
            if let Some(session) = self.sessions.read().get(id) {
                return Ok(session.clone());
            }
        }

        let mut sessions = self.sessions.write();
        let id = match id {
            Some(id) => {
                // Re-check under the write lock: another task may have
                // created it between the read above and now.
                if let Some(session) = sessions.get(id) {
                    return Ok(session.clone());
                }
                id.to_string()
            }
            None => uuid::Uuid::new_v4().to_string(),
        };

        let restored = self.store.get_session(&id)?;
        if restored.is_none() {
            self.store.create_session(&id, now_ms(), None)?;
        }

        let session = Session::spawn(
            id.clone(),
            self.store.clone(),
            self.engine.clone(),
            self.config.clone(),
            restored.as_ref(),
        );
        sessions.insert(id.clone(), session.clone());

        if restored.is_some() {
            tracing::info!(session_id = %id, "session rehydrated from store");
        } else {
            tracing::info!(session_id = %id, "session created");
        }
        Ok(session)
    }

    /// Lookup without creation.
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(id).cloned()
    }

    /// Snapshot of all in-memory sessions, most recent activity first.
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self
            .sessions
            .read()
            .values()
            .map(|s| s.info())
            .collect();
        infos.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        infos
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Unsubscribe a disconnecting client everywhere and start the idle
    /// clock for any session it left behind.
    pub fn on_client_disconnect(self: &Arc<Self>, client_id: &str) {
        let affected: Vec<String> = self
            .sessions
            .read()
            .iter()
            .filter(|(_, s)| s.is_subscribed(client_id))
            .map(|(id, _)| id.clone())
            .collect();

        for session_id in affected {
            if let Some(session) = self.get(&session_id) {
                session.unsubscribe(client_id);
            }
            self.schedule_idle_check(&session_id);
        }
    }

    /// Arm a one-shot reclamation check: after the grace period, the
    /// session is reclaimed iff it is still subscriber-free and idle.
    /// Re-subscription or a new turn during the window cancels it.
    pub fn schedule_idle_check(self: &Arc<Self>, session_id: &str) {
        let hub = self.clone();
        let session_id = session_id.to_string();
        let grace = self.config.idle_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            hub.idle_check(&session_id);
        });
    }

    /// Reclaim `session_id` if it has no subscribers, no running turn,
    /// and nothing queued. Returns whether it was reclaimed.
    pub fn idle_check(&self, session_id: &str) -> bool {
        let Some(session) = self.get(session_id) else {
            return false;
        };
        if !session.is_reclaimable() {
            return false;
        }

        // Re-check under the write lock so a racing subscribe loses
        // cleanly (it either lands before removal and blocks it, or
        // fetches a fresh session afterwards).
        let mut sessions = self.sessions.write();
        let Some(session) = sessions.get(session_id).cloned() else {
            return false;
        };
        if !session.is_reclaimable() {
            return false;
        }
        sessions.remove(session_id);
        drop(sessions);

        session.cleanup();
        tracing::info!(session_id, "idle session reclaimed");
        true
    }

    /// Safety-net sweep: reclaim sessions whose idle time already
    /// exceeds the grace period (covers checks lost to restarts).
    pub fn sweep_idle(&self) -> usize {
        let cutoff = now_ms() - self.config.idle_grace.as_millis() as i64;
        let stale: Vec<String> = self
            .sessions
            .read()
            .iter()
            .filter(|(_, s)| s.is_reclaimable() && s.last_activity() < cutoff)
            .map(|(id, _)| id.clone())
            .collect();

        stale
            .into_iter()
            .filter(|id| self.idle_check(id))
            .count()
    }

    /// Forcibly remove a session from memory regardless of subscribers
    /// or turn state (admin delete path). Returns whether it existed.
    pub fn evict(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().remove(session_id);
        match removed {
            Some(session) => {
                session.cleanup();
                tracing::info!(session_id, "session evicted");
                true
            }
            None => false,
        }
    }

    /// Cancel every running turn, close all queues, and persist final
    /// state. Called once at process shutdown.
    pub fn shutdown(&self) {
        let sessions: Vec<Arc<Session>> = {
            let mut map = self.sessions.write();
            map.drain().map(|(_, s)| s).collect()
        };
        tracing::info!(count = sessions.len(), "shutting down session hub");
        for session in sessions {
            session.cleanup();
        }
    }
}
