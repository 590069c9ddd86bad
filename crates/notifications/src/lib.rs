//! Consumer side of the order outbox.
//!
//! Each delivered `OrderCreated` event fans out to the SMS, EMAIL and FCM
//! channels. The event id is claimed before any channel is contacted and
//! recorded as seen in the same atomic unit as the notification rows, so a
//! redelivered event is acknowledged without a second round of sends.

pub mod error;
pub mod listener;
pub mod memory;
pub mod notification;
pub mod postgres;
pub mod sender;
pub mod service;
pub mod store;

pub use error::{NotificationError, Result};
pub use listener::OrderCreatedListener;
pub use memory::{InMemoryNotificationStore, InMemorySeenClaim};
pub use notification::{Channel, NewNotification, Notification, NotificationType};
pub use postgres::{PgSeenEventClaim, PostgresNotificationStore};
pub use sender::{InMemorySender, LoggingSender, NotificationSender};
pub use service::NotificationService;
pub use store::{NotificationStore, RecordOutcome, SeenEventClaim};
