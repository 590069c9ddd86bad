//! Message bus seam of the order outbox system.
//!
//! The dispatcher depends only on [`MessageBus::publish`]; consumers are
//! driven through [`MessageHandler::on_event`]. Delivery is at-least-once,
//! so handlers must tolerate seeing the same event id more than once.
//! The in-memory bus acknowledges once a message is appended to its log;
//! subscribers are fed from per-partition offsets that only advance when
//! the handler succeeds.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{BusError, Result};
pub use memory::{InMemoryMessageBus, PublishedMessage};
pub use traits::{MessageBus, MessageHandler};
