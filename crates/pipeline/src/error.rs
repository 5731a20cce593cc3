//! Pipeline error types

use thiserror::Error;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors from queue and routing operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    /// Non-blocking write found the buffer full
    #[error("queue full")]
    QueueFull,

    /// The queue was closed; for readers this is the normal shutdown
    /// signal, not a failure
    #[error("queue closed")]
    QueueClosed,
}
