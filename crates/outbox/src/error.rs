use bus::BusError;
use common::EventId;
use thiserror::Error;

use crate::OutboxStatus;

/// Errors that can occur when staging, claiming or dispatching outbox records.
#[derive(Debug, Error)]
pub enum OutboxError {
    /// A terminal record was asked to change state.
    #[error("Outbox record {id} is {status} and cannot transition")]
    InvalidTransition { id: i64, status: OutboxStatus },

    /// A record with this event id already exists.
    #[error("Duplicate event id: {0}")]
    DuplicateEventId(EventId),

    /// No decoder is registered for the record's event type.
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    /// The payload decoded to an event carrying a different event id.
    #[error("Payload event id {found} does not match record event id {expected}")]
    PayloadMismatch { expected: EventId, found: EventId },

    /// A stored status value could not be parsed.
    #[error("Unknown outbox status: {0}")]
    UnknownStatus(String),

    /// Publishing to the bus failed.
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for outbox operations.
pub type Result<T> = std::result::Result<T, OutboxError>;
