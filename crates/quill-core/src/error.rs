//! Error types for quill-core.

use std::time::Duration;

use thiserror::Error;

use crate::eval::Raised;

/// Result type for quill-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in quill-core.
#[derive(Debug, Error)]
pub enum Error {
    /// User code raised an exception.
    #[error("{}", .0.traceback)]
    Evaluation(Raised),

    /// IPC communication error with the worker process.
    #[error("IPC error: {0}")]
    Ipc(String),

    /// The evaluator worker failed or could not be started.
    #[error("worker error: {0}")]
    Worker(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A child process could not be run.
    #[error("shell error: {0}")]
    Shell(String),

    /// A child process exceeded its allotted time and was killed.
    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Invalid argument to a magic or kernel operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Text shown to the user when this error becomes an `error` payload.
    ///
    /// Evaluation errors carry the full trace; everything else uses its
    /// display message.
    pub fn trace(&self) -> String {
        match self {
            Error::Evaluation(raised) => raised.traceback.clone(),
            other => other.to_string(),
        }
    }

    /// Whether this error was raised by user code rather than the kernel.
    pub fn is_evaluation(&self) -> bool {
        matches!(self, Error::Evaluation(_))
    }
}
