use std::time::Duration;

use thiserror::Error;

/// Errors raised by the bus or by a handler consuming from it.
#[derive(Debug, Error)]
pub enum BusError {
    /// The broker could not be reached.
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    /// The broker refused the message.
    #[error("Broker rejected message: {0}")]
    Rejected(String),

    /// No acknowledgment arrived within the configured bound.
    #[error("Broker acknowledgment timed out after {0:?}")]
    AckTimeout(Duration),

    /// A consumer failed to handle a delivered message.
    #[error("Handler error: {0}")]
    Handler(String),
}

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
