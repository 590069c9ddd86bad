use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{EventId, OrderId};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::{
    NewNotification, Notification, Result,
    store::{NotificationStore, SeenEventClaim},
};

#[derive(Debug, Default)]
struct InMemoryNotificationState {
    seen: HashSet<EventId>,
    notifications: Vec<Notification>,
    next_id: i64,
}

type ClaimGates = Arc<Mutex<HashMap<EventId, Arc<Mutex<()>>>>>;

/// In-memory notification store.
///
/// Each event id has its own gate; a claim holds the gate until it commits
/// or is dropped, which matches a blocked `INSERT ... ON CONFLICT` on the
/// PostgreSQL side. The seen marker and the notifications are written under
/// one write lock.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationStore {
    state: Arc<RwLock<InMemoryNotificationState>>,
    gates: ClaimGates,
}

impl InMemoryNotificationStore {
    /// Creates a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored notifications.
    pub async fn notification_count(&self) -> usize {
        self.state.read().await.notifications.len()
    }

    /// Returns the number of event ids recorded as seen.
    pub async fn seen_count(&self) -> usize {
        self.state.read().await.seen.len()
    }
}

/// Claim on an event id held by an [`InMemoryNotificationStore`].
#[derive(Debug)]
pub struct InMemorySeenClaim {
    event_id: EventId,
    state: Arc<RwLock<InMemoryNotificationState>>,
    gates: ClaimGates,
    _gate: OwnedMutexGuard<()>,
}

#[async_trait]
impl SeenEventClaim for InMemorySeenClaim {
    fn event_id(&self) -> EventId {
        self.event_id
    }

    async fn commit(self, notifications: Vec<NewNotification>) -> Result<Vec<Notification>> {
        let mut state = self.state.write().await;
        state.seen.insert(self.event_id);

        let now = Utc::now();
        let mut stored = Vec::with_capacity(notifications.len());
        for new in notifications {
            state.next_id += 1;
            let notification = Notification {
                id: state.next_id,
                event_id: new.event_id,
                order_id: new.order_id,
                notification_type: new.notification_type,
                channel: new.channel,
                delivered: new.delivered,
                message: new.message,
                created_at: now,
            };
            state.notifications.push(notification.clone());
            stored.push(notification);
        }
        drop(state);

        // Waiters still holding the old gate see the id as seen
        self.gates.lock().await.remove(&self.event_id);
        Ok(stored)
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    type Claim = InMemorySeenClaim;

    async fn has_seen(&self, event_id: EventId) -> Result<bool> {
        Ok(self.state.read().await.seen.contains(&event_id))
    }

    async fn claim_event(&self, event_id: EventId) -> Result<Option<Self::Claim>> {
        let gate = {
            let mut gates = self.gates.lock().await;
            Arc::clone(gates.entry(event_id).or_default())
        };
        let guard = gate.lock_owned().await;

        if self.has_seen(event_id).await? {
            return Ok(None);
        }

        Ok(Some(InMemorySeenClaim {
            event_id,
            state: Arc::clone(&self.state),
            gates: Arc::clone(&self.gates),
            _gate: guard,
        }))
    }

    async fn get(&self, id: i64) -> Result<Option<Notification>> {
        Ok(self
            .state
            .read()
            .await
            .notifications
            .iter()
            .find(|n| n.id == id)
            .cloned())
    }

    async fn list_all(&self) -> Result<Vec<Notification>> {
        Ok(self.state.read().await.notifications.clone())
    }

    async fn find_by_order_id(&self, order_id: OrderId) -> Result<Vec<Notification>> {
        Ok(self
            .state
            .read()
            .await
            .notifications
            .iter()
            .filter(|n| n.order_id == order_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::Channel;
    use crate::store::RecordOutcome;

    fn notifications_for(event_id: EventId, order_id: i64) -> Vec<NewNotification> {
        Channel::ALL
            .into_iter()
            .map(|channel| NewNotification::sent(event_id, OrderId::new(order_id), channel))
            .collect()
    }

    #[tokio::test]
    async fn test_first_record_applies() {
        let store = InMemoryNotificationStore::new();
        let event_id = EventId::new();

        assert!(!store.has_seen(event_id).await.unwrap());
        let outcome = store
            .record_once(event_id, notifications_for(event_id, 1))
            .await
            .unwrap();

        let RecordOutcome::Applied(stored) = outcome else {
            panic!("expected applied");
        };
        assert_eq!(stored.len(), 3);
        assert_eq!(
            stored.iter().map(|n| n.id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(store.has_seen(event_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_second_record_is_duplicate_and_writes_nothing() {
        let store = InMemoryNotificationStore::new();
        let event_id = EventId::new();
        store
            .record_once(event_id, notifications_for(event_id, 1))
            .await
            .unwrap();

        let outcome = store
            .record_once(event_id, notifications_for(event_id, 1))
            .await
            .unwrap();

        assert!(outcome.is_duplicate());
        assert_eq!(store.notification_count().await, 3);
        assert_eq!(store.seen_count().await, 1);
    }

    #[tokio::test]
    async fn test_claim_blocks_second_claimer_until_commit() {
        let store = InMemoryNotificationStore::new();
        let event_id = EventId::new();
        let claim = store.claim_event(event_id).await.unwrap().unwrap();

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.claim_event(event_id).await.unwrap().is_some() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        claim.commit(notifications_for(event_id, 1)).await.unwrap();

        assert!(!waiter.await.unwrap());
        assert_eq!(store.notification_count().await, 3);
    }

    #[tokio::test]
    async fn test_dropped_claim_writes_nothing_and_frees_the_id() {
        let store = InMemoryNotificationStore::new();
        let event_id = EventId::new();

        let claim = store.claim_event(event_id).await.unwrap();
        assert!(claim.is_some());
        drop(claim);

        assert!(!store.has_seen(event_id).await.unwrap());
        let again = store.claim_event(event_id).await.unwrap().unwrap();
        assert_eq!(again.event_id(), event_id);
    }

    #[tokio::test]
    async fn test_queries() {
        let store = InMemoryNotificationStore::new();
        let a = EventId::new();
        let b = EventId::new();
        store.record_once(a, notifications_for(a, 1)).await.unwrap();
        store.record_once(b, notifications_for(b, 2)).await.unwrap();

        assert_eq!(store.list_all().await.unwrap().len(), 6);
        assert_eq!(store.find_by_order_id(OrderId::new(2)).await.unwrap().len(), 3);
        assert!(store.find_by_order_id(OrderId::new(9)).await.unwrap().is_empty());
        assert_eq!(store.get(4).await.unwrap().unwrap().event_id, b);
        assert!(store.get(99).await.unwrap().is_none());
    }
}
