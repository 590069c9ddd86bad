use common::{OrderCreated, OrderId};

use crate::{
    Channel, NewNotification, Notification, NotificationError, Result,
    sender::NotificationSender,
    store::{NotificationStore, RecordOutcome, SeenEventClaim},
};

/// Turns order events into notifications, at most once per event id.
pub struct NotificationService<S: NotificationStore, N: NotificationSender> {
    store: S,
    sender: N,
}

impl<S: NotificationStore, N: NotificationSender> NotificationService<S, N> {
    /// Creates a new notification service.
    pub fn new(store: S, sender: N) -> Self {
        Self { store, sender }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns a reference to the sender.
    pub fn sender(&self) -> &N {
        &self.sender
    }

    /// Handles one delivery of an `OrderCreated` event.
    ///
    /// A redelivered event id is a successful no-op. For a new event the id
    /// is claimed before anything is sent, so concurrent deliveries of the
    /// same id wait for the first one and then find it seen. Every channel
    /// is attempted; a failing channel is recorded as undelivered and does
    /// not stop the others. The notifications and the seen marker are then
    /// committed together.
    #[tracing::instrument(skip(self, event), fields(event_id = %event.event_id, order_id = %event.order_id))]
    pub async fn process_order_created(&self, event: &OrderCreated) -> Result<RecordOutcome> {
        let Some(claim) = self.store.claim_event(event.event_id).await? else {
            return Ok(self.duplicate());
        };

        let mut notifications = Vec::with_capacity(Channel::ALL.len());
        for channel in Channel::ALL {
            let notification = match self.sender.send(channel, event).await {
                Ok(()) => NewNotification::sent(event.event_id, event.order_id, channel),
                Err(e) => {
                    tracing::warn!(%channel, error = %e, "channel failed");
                    NewNotification::failed(event.event_id, event.order_id, channel, &e)
                }
            };
            notifications.push(notification);
        }

        let stored = claim.commit(notifications).await?;

        metrics::counter!("notifications_events_processed_total").increment(1);
        tracing::info!("event processed");
        Ok(RecordOutcome::Applied(stored))
    }

    fn duplicate(&self) -> RecordOutcome {
        metrics::counter!("notifications_duplicate_events_total").increment(1);
        tracing::info!("duplicate event ignored");
        RecordOutcome::Duplicate
    }

    /// Loads a notification by id.
    pub async fn get_notification(&self, id: i64) -> Result<Notification> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| NotificationError::NotFound(format!("notification {id}")))
    }

    /// Lists every notification.
    pub async fn list_notifications(&self) -> Result<Vec<Notification>> {
        self.store.list_all().await
    }

    /// Lists the notifications sent for an order.
    pub async fn notifications_for_order(&self, order_id: OrderId) -> Result<Vec<Notification>> {
        let notifications = self.store.find_by_order_id(order_id).await?;
        if notifications.is_empty() {
            return Err(NotificationError::NotFound(format!(
                "notifications for order {order_id}"
            )));
        }
        Ok(notifications)
    }
}
