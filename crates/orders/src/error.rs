//! Order error types.

use common::OrderId;
use outbox::OutboxError;
use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Customer email is required.
    #[error("Customer email is required")]
    CustomerEmailRequired,

    /// Customer email is malformed.
    #[error("Invalid email format: {email}")]
    InvalidEmail { email: String },

    /// Product code is required.
    #[error("Product code is required")]
    ProductCodeRequired,

    /// Product code exceeds the column width.
    #[error("Product code must not exceed {max} characters (got {len})")]
    ProductCodeTooLong { len: usize, max: usize },

    /// Invalid quantity.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: i32 },

    /// Invalid paging parameters.
    #[error("Invalid page request: {0}")]
    InvalidPage(String),

    /// A stored status value could not be parsed.
    #[error("Unknown order status: {0}")]
    UnknownStatus(String),

    /// Order not found.
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// Staging the outbox record failed.
    #[error("Outbox error: {0}")]
    Outbox(#[from] OutboxError),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OrderError {
    /// Returns true for errors caused by the request rather than the system.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::CustomerEmailRequired
                | Self::InvalidEmail { .. }
                | Self::ProductCodeRequired
                | Self::ProductCodeTooLong { .. }
                | Self::InvalidQuantity { .. }
                | Self::InvalidPage(_)
        )
    }
}

/// Convenience type alias for order results.
pub type Result<T> = std::result::Result<T, OrderError>;
