//! Event contracts exchanged over the bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{EventId, OrderId};

/// An event that can be staged in the outbox and published to the bus.
pub trait OutboxEvent: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Tag stored alongside the payload, used to pick the decoder at dispatch time.
    const EVENT_TYPE: &'static str;

    /// The idempotency token of this event.
    fn event_id(&self) -> EventId;
}

/// Emitted once for every order persisted by the order write path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreated {
    pub event_id: EventId,
    pub occurred_at: DateTime<Utc>,
    pub order_id: OrderId,
    pub customer_email: String,
    pub product_code: String,
    pub quantity: i32,
}

impl OutboxEvent for OrderCreated {
    const EVENT_TYPE: &'static str = "ORDER";

    fn event_id(&self) -> EventId {
        self.event_id
    }
}
