//! Identifiers and event contracts shared by producers and consumers.

pub mod events;
pub mod types;

pub use events::{OrderCreated, OutboxEvent};
pub use types::{EventId, OrderId};
