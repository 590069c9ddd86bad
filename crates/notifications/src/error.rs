use thiserror::Error;

use crate::Channel;

/// Errors that can occur while consuming order events.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// The requested notification (or set of notifications) does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A channel failed to deliver.
    #[error("{channel} delivery failed: {reason}")]
    Delivery { channel: Channel, reason: String },

    /// The delivery key and the payload disagree about the event id.
    #[error("Event id mismatch: key {key}, payload {payload}")]
    EventIdMismatch { key: String, payload: String },

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Unknown notification type: {0}")]
    UnknownType(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for notification operations.
pub type Result<T> = std::result::Result<T, NotificationError>;
