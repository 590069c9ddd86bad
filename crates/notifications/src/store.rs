use async_trait::async_trait;
use common::{EventId, OrderId};

use crate::{NewNotification, Notification, Result};

/// Outcome of recording the side effects of an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The event was new; its notifications were stored.
    Applied(Vec<Notification>),
    /// The event had already been seen; nothing was written.
    Duplicate,
}

impl RecordOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate)
    }
}

/// Exclusive hold on an event id that has not been seen yet.
///
/// While a claim is alive, any other claim for the same id waits. Committing
/// marks the id as seen and stores the notifications in one atomic unit;
/// dropping the claim writes nothing and lets the next waiter proceed.
#[async_trait]
pub trait SeenEventClaim: Send {
    fn event_id(&self) -> EventId;

    async fn commit(self, notifications: Vec<NewNotification>) -> Result<Vec<Notification>>;
}

/// Persistence for the seen-event set and the notifications it guards.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    type Claim: SeenEventClaim;

    /// Returns true if `event_id` has already been recorded as seen.
    async fn has_seen(&self, event_id: EventId) -> Result<bool>;

    /// Claims `event_id` for processing.
    ///
    /// Waits for any concurrent claim on the same id to finish. Returns
    /// `None` if the id has been seen by the time the claim is granted.
    async fn claim_event(&self, event_id: EventId) -> Result<Option<Self::Claim>>;

    /// Marks `event_id` as seen and stores `notifications`, as one atomic unit.
    ///
    /// If the event id is already present nothing is written and
    /// [`RecordOutcome::Duplicate`] is returned.
    async fn record_once(
        &self,
        event_id: EventId,
        notifications: Vec<NewNotification>,
    ) -> Result<RecordOutcome> {
        match self.claim_event(event_id).await? {
            Some(claim) => Ok(RecordOutcome::Applied(claim.commit(notifications).await?)),
            None => Ok(RecordOutcome::Duplicate),
        }
    }

    async fn get(&self, id: i64) -> Result<Option<Notification>>;

    /// Lists every notification by ascending id.
    async fn list_all(&self) -> Result<Vec<Notification>>;

    async fn find_by_order_id(&self, order_id: OrderId) -> Result<Vec<Notification>>;
}
