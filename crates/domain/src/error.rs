/// Shared error type used across all ccsdk crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// A bounded buffer is full (prompt queue or subscriber channel).
    #[error("backpressure: queue full")]
    Backpressure,

    /// The prompt queue has been closed; no further submissions.
    #[error("queue closed")]
    Closed,

    /// Cancellation was observed mid-turn.
    #[error("cancelled")]
    Cancelled,

    #[error("engine: {0}")]
    Engine(String),

    #[error("store: {0}")]
    Store(String),

    /// The session was reclaimed; its in-memory state no longer exists.
    #[error("session gone")]
    Gone,

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for the errors that terminate a turn (as opposed to being
    /// reported to a single caller and swallowed).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Error::Cancelled | Error::Engine(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(Error::Backpressure.to_string(), "backpressure: queue full");
        assert_eq!(Error::Gone.to_string(), "session gone");
        assert_eq!(
            Error::Engine("spawn failed".into()).to_string(),
            "engine: spawn failed"
        );
    }

    #[test]
    fn terminal_classification() {
        assert!(Error::Cancelled.is_terminal());
        assert!(Error::Engine("x".into()).is_terminal());
        assert!(!Error::Backpressure.is_terminal());
        assert!(!Error::Store("x".into()).is_terminal());
    }
}
