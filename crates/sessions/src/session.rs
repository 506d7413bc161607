//! Per-session state machine and turn runner.
//!
//! Each session owns a prompt queue, a subscriber set, and exactly one
//! runner task that loops over the queue: dequeue a prompt, stream the
//! engine turn, and for every event persist a row and fan out a frame.
//! External callers never mutate turn state directly — `submit` enqueues,
//! `cancel` fires the abort token, `subscribe`/`unsubscribe` edit the
//! subscriber set.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use ccsdk_domain::{Config, Error, Result};
use ccsdk_engine::{EngineAdapter, EngineEvent, EngineOptions};
use ccsdk_protocol::{ServerFrame, SessionInfo};
use ccsdk_store::{Database, MessageType, NewMessage, SessionPatch, SessionRecord};

use crate::now_ms;
use crate::queue::PromptQueue;

/// Send handle for pushing frames to one subscriber's writer task.
pub type ClientSink = mpsc::Sender<ServerFrame>;

/// One conversation: durable id, queue, subscribers, turn state.
pub struct Session {
    id: String,
    created_at: i64,
    queue: PromptQueue,
    subscribers: RwLock<HashMap<String, ClientSink>>,
    /// Abort handle of the in-flight turn, if any.
    current_cancel: Mutex<Option<CancellationToken>>,
    /// Engine-issued resume token, captured from the first `init` event.
    engine_session_id: Mutex<Option<String>>,
    message_count: AtomicU64,
    last_activity: AtomicI64,
    running: AtomicBool,
    /// Set by `cleanup()`; submissions fail with `Gone` afterwards.
    closed: AtomicBool,

    store: Database,
    engine: Arc<dyn EngineAdapter>,
    config: Arc<Config>,
}

impl Session {
    /// Create the session and spawn its turn-runner task. `restored`
    /// rehydrates counters and the resume token from a persisted row.
    pub fn spawn(
        id: String,
        store: Database,
        engine: Arc<dyn EngineAdapter>,
        config: Arc<Config>,
        restored: Option<&SessionRecord>,
    ) -> Arc<Self> {
        let (queue, rx) = PromptQueue::new(config.queue_capacity);
        let now = now_ms();

        let session = Arc::new(Self {
            id,
            created_at: restored.map_or(now, |r| r.created_at),
            queue,
            subscribers: RwLock::new(HashMap::new()),
            current_cancel: Mutex::new(None),
            engine_session_id: Mutex::new(restored.and_then(|r| r.engine_session_id.clone())),
            message_count: AtomicU64::new(restored.map_or(0, |r| r.message_count)),
            last_activity: AtomicI64::new(restored.map_or(now, |r| r.last_activity)),
            running: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            store,
            engine,
            config,
        });

        tokio::spawn(Self::run_loop(session.clone(), rx));
        session
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Point-in-time snapshot for the wire.
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            message_count: self.message_count.load(Ordering::Relaxed),
            is_active: self.is_running(),
            created_at: self.created_at,
            last_activity: self.last_activity.load(Ordering::Relaxed),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// True when the session can be reclaimed: nothing running, nothing
    /// queued, nobody listening.
    pub fn is_reclaimable(&self) -> bool {
        !self.is_running() && self.queue.is_empty() && self.subscriber_count() == 0
    }

    pub fn last_activity(&self) -> i64 {
        self.last_activity.load(Ordering::Relaxed)
    }

    fn touch(&self) {
        self.last_activity.store(now_ms(), Ordering::Relaxed);
    }

    // ── Submission ───────────────────────────────────────────────────

    /// Queue a prompt for the turn runner. The `user` message is
    /// persisted here, before the prompt becomes visible to the runner,
    /// so history rows always lead their turn's event rows.
    pub fn submit(&self, prompt: &str) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Gone);
        }
        let tx = self.queue.sender().ok_or(Error::Gone)?;

        // Reserve the slot first: a Backpressure failure must not leave a
        // dangling user row behind.
        let permit = tx.try_reserve().map_err(|e| match e {
            TrySendError::Full(()) => Error::Backpressure,
            TrySendError::Closed(()) => Error::Gone,
        })?;

        let now = now_ms();
        self.persist(NewMessage {
            content: Some(prompt.to_string()),
            ..NewMessage::new(&self.id, MessageType::User, now)
        });
        self.touch();

        if let Err(e) = self.store.update_session(
            &self.id,
            &SessionPatch {
                is_active: Some(true),
                last_activity: Some(now),
                ..SessionPatch::default()
            },
        ) {
            tracing::warn!(session_id = %self.id, error = %e, "failed to mark session active");
        }

        permit.send(prompt.to_string());
        Ok(())
    }

    // ── Subscribers ──────────────────────────────────────────────────

    /// Attach a client. Sends a `session_info` snapshot on first attach;
    /// re-subscribing the same client is a no-op.
    pub fn subscribe(&self, client_id: &str, sink: ClientSink) {
        let mut subscribers = self.subscribers.write();
        if subscribers.contains_key(client_id) {
            return;
        }
        let _ = sink.try_send(ServerFrame::SessionInfoFrame { data: self.info() });
        subscribers.insert(client_id.to_string(), sink);
        tracing::debug!(session_id = %self.id, client_id, "subscriber attached");
    }

    /// Detach a client. Returns whether it was attached.
    pub fn unsubscribe(&self, client_id: &str) -> bool {
        let removed = self.subscribers.write().remove(client_id).is_some();
        if removed {
            tracing::debug!(session_id = %self.id, client_id, "subscriber detached");
        }
        removed
    }

    pub fn is_subscribed(&self, client_id: &str) -> bool {
        self.subscribers.read().contains_key(client_id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Deliver a frame to every subscriber. A full or closed sink drops
    /// that subscriber only; the rest are unaffected.
    fn broadcast(&self, frame: ServerFrame) {
        let snapshot: Vec<(String, ClientSink)> = self
            .subscribers
            .read()
            .iter()
            .map(|(id, sink)| (id.clone(), sink.clone()))
            .collect();

        let mut dead = Vec::new();
        for (client_id, sink) in snapshot {
            if sink.try_send(frame.clone()).is_err() {
                dead.push(client_id);
            }
        }
        if !dead.is_empty() {
            let mut subscribers = self.subscribers.write();
            for client_id in dead {
                subscribers.remove(&client_id);
                tracing::debug!(
                    session_id = %self.id,
                    client_id,
                    "dropped unresponsive subscriber"
                );
            }
        }
    }

    // ── Cancellation & lifecycle ─────────────────────────────────────

    /// Abort the in-flight turn, if any. Idempotent; no-op when idle.
    pub fn cancel(&self) -> bool {
        let token = self.current_cancel.lock().clone();
        match token {
            Some(token) => {
                token.cancel();
                self.broadcast(ServerFrame::Cancelling {
                    session_id: self.id.clone(),
                    message: "cancelling current turn".into(),
                });
                true
            }
            None => false,
        }
    }

    /// Abort any running turn and forget the engine conversation: the
    /// next submit starts fresh, with no resume token. Persisted history
    /// is untouched.
    pub fn end_conversation(&self) {
        self.cancel();
        *self.engine_session_id.lock() = None;
        self.message_count.store(0, Ordering::Relaxed);
        if let Err(e) = self.store.update_session(
            &self.id,
            &SessionPatch {
                is_active: Some(false),
                ..SessionPatch::default()
            },
        ) {
            tracing::warn!(session_id = %self.id, error = %e, "failed to persist conversation end");
        }
        tracing::info!(session_id = %self.id, "conversation ended");
    }

    /// Tear down in-memory state ahead of reclamation: abort, close the
    /// queue (the runner task exits after the current turn), drop
    /// subscribers, persist `is_active = false`.
    pub fn cleanup(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(token) = self.current_cancel.lock().clone() {
            token.cancel();
        }
        self.queue.close();
        self.subscribers.write().clear();
        if let Err(e) = self.store.update_session(
            &self.id,
            &SessionPatch {
                is_active: Some(false),
                last_activity: Some(now_ms()),
                ..SessionPatch::default()
            },
        ) {
            tracing::warn!(session_id = %self.id, error = %e, "failed to persist cleanup");
        }
    }

    pub fn resume_token(&self) -> Option<String> {
        self.engine_session_id.lock().clone()
    }

    // ── Turn runner ──────────────────────────────────────────────────

    async fn run_loop(self: Arc<Self>, mut rx: mpsc::Receiver<String>) {
        while let Some(prompt) = rx.recv().await {
            self.run_turn(prompt).await;
        }
        tracing::debug!(session_id = %self.id, "turn runner stopped");
    }

    async fn run_turn(&self, prompt: String) {
        let cancel = CancellationToken::new();
        *self.current_cancel.lock() = Some(cancel.clone());
        self.running.store(true, Ordering::Release);

        let mut options = EngineOptions::from_config(&self.config);
        options.resume_token = self.resume_token();

        let outcome = self.drive_stream(&prompt, options, cancel).await;

        match outcome {
            Ok(()) => {}
            Err(Error::Cancelled) => {
                self.persist(NewMessage {
                    subtype: Some("cancelled".into()),
                    content: Some("turn cancelled".into()),
                    ..NewMessage::new(&self.id, MessageType::System, now_ms())
                });
                self.broadcast(ServerFrame::Cancelled {
                    session_id: self.id.clone(),
                    message: "turn cancelled".into(),
                });
                tracing::info!(session_id = %self.id, "turn cancelled");
            }
            Err(e) => {
                let message = e.to_string();
                tracing::error!(session_id = %self.id, error = %message, "turn failed");
                self.persist(NewMessage {
                    content: Some(message.clone()),
                    ..NewMessage::new(&self.id, MessageType::Error, now_ms())
                });
                self.broadcast(ServerFrame::Error {
                    error: message,
                    session_id: Some(self.id.clone()),
                });
            }
        }

        self.running.store(false, Ordering::Release);
        *self.current_cancel.lock() = None;
        self.touch();

        if let Err(e) = self.store.update_session(
            &self.id,
            &SessionPatch {
                is_active: Some(false),
                last_activity: Some(self.last_activity()),
                ..SessionPatch::default()
            },
        ) {
            tracing::warn!(session_id = %self.id, error = %e, "failed to mark session idle");
        }
    }

    async fn drive_stream(
        &self,
        prompt: &str,
        options: EngineOptions,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut stream = self.engine.stream(prompt, options, cancel).await?;
        while let Some(next) = stream.next().await {
            let event = next?;
            if self.handle_event(event) {
                break;
            }
        }
        Ok(())
    }

    /// Per-event discipline: build the wire frame, persist the row, fan
    /// out — in that order. Returns true on the terminal event.
    fn handle_event(&self, event: EngineEvent) -> bool {
        let now = now_ms();
        match event {
            EngineEvent::System {
                subtype,
                session_id,
                data,
            } => {
                if subtype == "init" {
                    if let Some(token) = session_id {
                        *self.engine_session_id.lock() = Some(token.clone());
                        if let Err(e) = self.store.update_session(
                            &self.id,
                            &SessionPatch {
                                engine_session_id: Some(token),
                                ..SessionPatch::default()
                            },
                        ) {
                            tracing::warn!(
                                session_id = %self.id,
                                error = %e,
                                "failed to persist engine session id"
                            );
                        }
                    }
                }
                let frame = ServerFrame::System {
                    subtype: subtype.clone(),
                    session_id: self.id.clone(),
                    data: Some(data.clone()),
                };
                self.persist(NewMessage {
                    subtype: Some(subtype),
                    metadata: Some(data),
                    ..NewMessage::new(&self.id, MessageType::System, now)
                });
                self.broadcast(frame);
                false
            }

            EngineEvent::Assistant { text } => {
                let frame = ServerFrame::AssistantMessage {
                    content: text.clone(),
                    session_id: self.id.clone(),
                };
                self.persist(NewMessage {
                    subtype: Some("text".into()),
                    content: Some(text),
                    ..NewMessage::new(&self.id, MessageType::Assistant, now)
                });
                self.broadcast(frame);
                false
            }

            EngineEvent::ToolUse {
                tool_name,
                tool_id,
                tool_input,
            } => {
                let frame = ServerFrame::ToolUse {
                    tool_name: tool_name.clone(),
                    tool_id: tool_id.clone(),
                    tool_input: tool_input.clone(),
                    session_id: self.id.clone(),
                };
                self.persist(NewMessage {
                    subtype: Some(tool_name),
                    content: Some(tool_input.to_string()),
                    metadata: Some(serde_json::json!({ "toolId": tool_id })),
                    ..NewMessage::new(&self.id, MessageType::ToolUse, now)
                });
                self.broadcast(frame);
                false
            }

            EngineEvent::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => {
                let frame = ServerFrame::ToolResult {
                    tool_use_id: tool_use_id.clone(),
                    content: content.clone(),
                    is_error,
                    session_id: self.id.clone(),
                };
                self.persist(NewMessage {
                    content: Some(content),
                    metadata: Some(serde_json::json!({
                        "toolUseId": tool_use_id,
                        "isError": is_error,
                    })),
                    ..NewMessage::new(&self.id, MessageType::ToolResult, now)
                });
                self.broadcast(frame);
                false
            }

            EngineEvent::Result {
                subtype,
                is_error,
                result_text,
                total_cost_usd,
                duration_ms,
            } => {
                let frame = ServerFrame::Result {
                    success: !is_error,
                    result: result_text.clone(),
                    cost: total_cost_usd,
                    duration: duration_ms,
                    error: is_error.then(|| subtype.clone()),
                    session_id: self.id.clone(),
                };
                self.persist(NewMessage {
                    subtype: Some(subtype),
                    content: result_text,
                    cost: total_cost_usd,
                    duration: duration_ms.map(|d| d as i64),
                    ..NewMessage::new(&self.id, MessageType::Result, now)
                });
                self.broadcast(frame);
                true
            }

            // Prompt echo from the engine: already persisted at submit.
            EngineEvent::User { .. } => false,
        }
    }

    /// Append a row, mirroring the count in memory. Store failures are
    /// logged and bypassed so the turn keeps streaming.
    fn persist(&self, msg: NewMessage) {
        match self.store.append_message(&msg) {
            Ok(_) => {
                self.message_count.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %self.id,
                    kind = msg.kind.as_str(),
                    error = %e,
                    "failed to persist message"
                );
            }
        }
    }
}
