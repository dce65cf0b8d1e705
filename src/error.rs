//! Error taxonomy for the crawler.
//!
//! Two layers mirror the two recovery boundaries:
//!
//! - [`BoardError`]: a single remote operation failed. `NotFound` and
//!   `Transient` are recovered below the task level (skip / retry-then-skip);
//!   `Auth` is not recoverable anywhere.
//! - [`TaskError`]: a task failed as a whole. The batch runner logs it and
//!   moves on, unless [`TaskError::is_fatal`] says the session itself is
//!   gone.

use thiserror::Error;

/// Failure of one remote board operation.
#[derive(Debug, Error)]
pub enum BoardError {
    /// The session was rejected or expired. Nothing can proceed without one.
    #[error("authentication rejected: {reason}")]
    Auth { reason: String },

    /// The article at this index is gone (deleted or never existed).
    #[error("article {board}#{index} not found")]
    NotFound { board: String, index: u32 },

    /// Timeout, disconnect, or a malformed response that a retry may fix.
    #[error("transient remote failure: {0}")]
    Transient(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl BoardError {
    pub fn transient<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        BoardError::Transient(Box::new(err))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, BoardError::Transient(_))
    }
}

/// Failure of one task in the batch.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The task description itself is unusable (unknown type, `end <= start`,
    /// missing field). Reported per task; the batch continues.
    #[error("invalid task config: {0}")]
    InvalidConfig(String),

    /// A remote failure that escaped the per-index recovery (in practice,
    /// only `Auth` or an exhausted retry on a call the strategy cannot skip).
    #[error(transparent)]
    Board(#[from] BoardError),

    /// The result sink could not be written.
    #[error("failed to write output {path}")]
    Output {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl TaskError {
    /// Only a dead session aborts the whole batch.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TaskError::Board(BoardError::Auth { .. }))
    }
}
