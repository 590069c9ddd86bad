//! Bus subscription for `OrderCreated` events.

use std::sync::Arc;

use async_trait::async_trait;
use bus::{BusError, MessageHandler};
use common::{EventId, OrderCreated};

use crate::{
    NotificationError, NotificationService, sender::NotificationSender, store::NotificationStore,
};

/// Feeds delivered `OrderCreated` messages into a [`NotificationService`].
pub struct OrderCreatedListener<S: NotificationStore, N: NotificationSender> {
    service: Arc<NotificationService<S, N>>,
}

impl<S: NotificationStore, N: NotificationSender> OrderCreatedListener<S, N> {
    pub fn new(service: Arc<NotificationService<S, N>>) -> Self {
        Self { service }
    }

    fn decode(event_id: EventId, payload: &[u8]) -> Result<OrderCreated, NotificationError> {
        let event: OrderCreated = serde_json::from_slice(payload)?;
        if event.event_id != event_id {
            return Err(NotificationError::EventIdMismatch {
                key: event_id.to_string(),
                payload: event.event_id.to_string(),
            });
        }
        Ok(event)
    }
}

#[async_trait]
impl<S: NotificationStore, N: NotificationSender> MessageHandler for OrderCreatedListener<S, N> {
    async fn on_event(&self, event_id: EventId, payload: &[u8]) -> bus::Result<()> {
        let event = Self::decode(event_id, payload).map_err(|e| {
            tracing::error!(%event_id, error = %e, "rejecting undecodable order event");
            BusError::Handler(e.to_string())
        })?;

        self.service
            .process_order_created(&event)
            .await
            .map_err(|e| BusError::Handler(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InMemoryNotificationStore, InMemorySender};
    use bus::{InMemoryMessageBus, MessageBus};
    use chrono::Utc;
    use common::OrderId;

    type TestListener = OrderCreatedListener<InMemoryNotificationStore, InMemorySender>;

    fn setup() -> (Arc<NotificationService<InMemoryNotificationStore, InMemorySender>>, TestListener) {
        let service = Arc::new(NotificationService::new(
            InMemoryNotificationStore::new(),
            InMemorySender::new(),
        ));
        let listener = OrderCreatedListener::new(service.clone());
        (service, listener)
    }

    fn payload() -> (EventId, Vec<u8>) {
        let event = OrderCreated {
            event_id: EventId::new(),
            occurred_at: Utc::now(),
            order_id: OrderId::new(3),
            customer_email: "jane@example.com".to_string(),
            product_code: "SKU-001".to_string(),
            quantity: 1,
        };
        (event.event_id, serde_json::to_vec(&event).unwrap())
    }

    #[tokio::test]
    async fn test_delivery_creates_notifications() {
        let (service, listener) = setup();
        let (event_id, bytes) = payload();

        listener.on_event(event_id, &bytes).await.unwrap();

        assert_eq!(service.store().notification_count().await, 3);
    }

    #[tokio::test]
    async fn test_redelivery_is_acknowledged_without_side_effects() {
        let (service, listener) = setup();
        let (event_id, bytes) = payload();

        listener.on_event(event_id, &bytes).await.unwrap();
        listener.on_event(event_id, &bytes).await.unwrap();

        assert_eq!(service.store().notification_count().await, 3);
        assert_eq!(service.store().seen_count().await, 1);
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_rejected() {
        let (service, listener) = setup();

        let result = listener.on_event(EventId::new(), b"{not json").await;

        assert!(matches!(result, Err(BusError::Handler(_))));
        assert_eq!(service.store().seen_count().await, 0);
    }

    #[tokio::test]
    async fn test_key_mismatch_is_rejected() {
        let (service, listener) = setup();
        let (_, bytes) = payload();

        let result = listener.on_event(EventId::new(), &bytes).await;

        assert!(matches!(result, Err(BusError::Handler(_))));
        assert_eq!(service.store().notification_count().await, 0);
    }

    #[tokio::test]
    async fn test_bus_redelivery_through_subscription() {
        let (service, listener) = setup();
        let bus = InMemoryMessageBus::new();
        bus.subscribe(Arc::new(listener)).await;
        let (event_id, bytes) = payload();

        bus.publish("order-created", &event_id.to_string(), &bytes)
            .await
            .unwrap();
        assert_eq!(bus.deliver_pending().await, 1);
        assert_eq!(bus.redeliver_all().await, 1);
        assert_eq!(bus.redeliver_all().await, 1);

        assert_eq!(service.store().notification_count().await, 3);
        assert_eq!(service.sender().sent_count().await, 3);
        assert_eq!(bus.pending_deliveries().await, 0);
    }

    #[tokio::test]
    async fn test_rejected_delivery_stays_pending_on_the_bus() {
        let (service, listener) = setup();
        let bus = InMemoryMessageBus::new();
        bus.subscribe(Arc::new(listener)).await;
        let (_, bytes) = payload();

        bus.publish("order-created", &EventId::new().to_string(), &bytes)
            .await
            .unwrap();

        assert_eq!(bus.deliver_pending().await, 0);
        assert_eq!(bus.pending_deliveries().await, 1);
        assert_eq!(service.store().notification_count().await, 0);
    }
}
