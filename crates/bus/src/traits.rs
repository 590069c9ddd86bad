use async_trait::async_trait;
use common::EventId;

use crate::Result;

/// Producer side of the message bus.
///
/// Messages sharing a key land on the same partition, so their relative
/// order is preserved.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publishes `payload` to `topic` and waits for the broker's acknowledgment.
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<()>;
}

/// Consumer side of the message bus.
///
/// Invoked once per delivered message. The same `event_id` may be delivered
/// more than once and implementations must treat redelivery as a no-op.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn on_event(&self, event_id: EventId, payload: &[u8]) -> Result<()>;
}
