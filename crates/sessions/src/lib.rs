//! The session hub: per-session state machines, prompt queues, turn
//! runners, subscriber fan-out, and idle reclamation.
//!
//! Ownership is one-directional to avoid cycles: the [`SessionHub`] owns
//! [`Session`]s; a session holds only client ids plus send handles for its
//! subscribers; clients hold the current session id by value.

pub mod hub;
pub mod queue;
pub mod session;

pub use hub::SessionHub;
pub use queue::PromptQueue;
pub use session::{ClientSink, Session};

/// Epoch milliseconds, the clock used for all persisted timestamps.
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
