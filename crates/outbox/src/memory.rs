use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::EventId;
use tokio::sync::RwLock;

use crate::{
    NewOutboxRecord, OutboxError, OutboxRecord, OutboxStatus, Result,
    store::{ClaimedRecord, OutboxStore},
};

#[derive(Debug, Default)]
struct InMemoryOutboxState {
    records: BTreeMap<i64, OutboxRecord>,
    next_id: i64,
}

/// Ids of records currently held by a claim.
///
/// Only ever locked for a set operation, never across an await, so that a
/// claim can release itself from `Drop`.
type LockSet = Arc<Mutex<HashSet<i64>>>;

fn lock_set(locked: &Mutex<HashSet<i64>>) -> MutexGuard<'_, HashSet<i64>> {
    locked.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory outbox store for testing.
///
/// Mirrors the PostgreSQL claim semantics: a claimed record is held in a
/// lock set and skipped by other claimers until its claim is saved or
/// dropped.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOutboxStore {
    state: Arc<RwLock<InMemoryOutboxState>>,
    locked: LockSet,
}

impl InMemoryOutboxStore {
    /// Creates a new empty in-memory outbox store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of records stored.
    pub async fn record_count(&self) -> usize {
        self.state.read().await.records.len()
    }

    /// Returns the number of records currently claimed.
    pub fn locked_count(&self) -> usize {
        lock_set(&self.locked).len()
    }

    /// Returns a snapshot of every record, ordered by id.
    pub async fn records(&self) -> Vec<OutboxRecord> {
        self.state.read().await.records.values().cloned().collect()
    }

    /// Inserts a record with an explicit creation time.
    pub async fn insert_at(
        &self,
        record: NewOutboxRecord,
        created_at: DateTime<Utc>,
    ) -> Result<OutboxRecord> {
        let mut state = self.state.write().await;

        if state
            .records
            .values()
            .any(|r| r.event_id == record.event_id)
        {
            return Err(OutboxError::DuplicateEventId(record.event_id));
        }

        state.next_id += 1;
        let stored = OutboxRecord {
            id: state.next_id,
            event_id: record.event_id,
            event_type: record.event_type,
            payload: record.payload,
            status: OutboxStatus::Pending,
            created_at,
            updated_at: created_at,
            processed_at: None,
            retry_count: 0,
            last_attempt_at: None,
        };
        state.records.insert(stored.id, stored.clone());
        Ok(stored)
    }
}

/// A record claimed from an [`InMemoryOutboxStore`].
#[derive(Debug)]
pub struct InMemoryClaim {
    state: Arc<RwLock<InMemoryOutboxState>>,
    locked: LockSet,
    record: OutboxRecord,
}

impl Drop for InMemoryClaim {
    fn drop(&mut self) {
        lock_set(&self.locked).remove(&self.record.id);
    }
}

#[async_trait]
impl ClaimedRecord for InMemoryClaim {
    fn record(&self) -> &OutboxRecord {
        &self.record
    }

    fn record_mut(&mut self) -> &mut OutboxRecord {
        &mut self.record
    }

    async fn save(self) -> Result<OutboxRecord> {
        let mut state = self.state.write().await;
        let stored = state
            .records
            .get_mut(&self.record.id)
            .ok_or(OutboxError::Database(sqlx::Error::RowNotFound))?;

        if !stored.is_pending() {
            return Err(OutboxError::InvalidTransition {
                id: stored.id,
                status: stored.status,
            });
        }

        stored.status = self.record.status;
        stored.updated_at = self.record.updated_at;
        stored.processed_at = self.record.processed_at;
        stored.retry_count = self.record.retry_count;
        stored.last_attempt_at = self.record.last_attempt_at;
        Ok(stored.clone())
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    type Claim = InMemoryClaim;

    async fn insert(&self, record: NewOutboxRecord) -> Result<OutboxRecord> {
        self.insert_at(record, Utc::now()).await
    }

    async fn claim_next(&self, cutoff: DateTime<Utc>) -> Result<Option<Self::Claim>> {
        let state = self.state.read().await;
        let mut locked = lock_set(&self.locked);

        let candidate = state
            .records
            .values()
            .filter(|r| r.is_pending() && !locked.contains(&r.id))
            .filter(|r| r.last_attempt_at.is_none_or(|at| at < cutoff))
            .min_by_key(|r| (r.created_at, r.id))
            .cloned();

        Ok(candidate.map(|record| {
            locked.insert(record.id);
            InMemoryClaim {
                state: Arc::clone(&self.state),
                locked: Arc::clone(&self.locked),
                record,
            }
        }))
    }

    async fn get(&self, id: i64) -> Result<Option<OutboxRecord>> {
        Ok(self.state.read().await.records.get(&id).cloned())
    }

    async fn find_by_event_id(&self, event_id: EventId) -> Result<Option<OutboxRecord>> {
        Ok(self
            .state
            .read()
            .await
            .records
            .values()
            .find(|r| r.event_id == event_id)
            .cloned())
    }

    async fn list_by_status(
        &self,
        status: OutboxStatus,
        limit: usize,
    ) -> Result<Vec<OutboxRecord>> {
        let state = self.state.read().await;
        let mut records: Vec<_> = state
            .records
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.created_at, r.id));
        records.truncate(limit);
        Ok(records)
    }

    async fn count_by_status(&self, status: OutboxStatus) -> Result<u64> {
        let state = self.state.read().await;
        Ok(state.records.values().filter(|r| r.status == status).count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::OutboxStoreExt;
    use chrono::Duration;

    fn new_record() -> NewOutboxRecord {
        NewOutboxRecord::new(EventId::new(), "ORDER", "{}")
    }

    #[tokio::test]
    async fn test_insert_assigns_ids_and_pending_status() {
        let store = InMemoryOutboxStore::new();

        let first = store.insert(new_record()).await.unwrap();
        let second = store.insert(new_record()).await.unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(first.status, OutboxStatus::Pending);
        assert_eq!(first.retry_count, 0);
        assert!(first.processed_at.is_none());
        assert_eq!(store.record_count().await, 2);
    }

    #[tokio::test]
    async fn test_duplicate_event_id_rejected() {
        let store = InMemoryOutboxStore::new();
        let record = new_record();

        store.insert(record.clone()).await.unwrap();
        let result = store.insert(record).await;

        assert!(matches!(result, Err(OutboxError::DuplicateEventId(_))));
        assert_eq!(store.record_count().await, 1);
    }

    #[tokio::test]
    async fn test_claim_batch_returns_oldest_first() {
        let store = InMemoryOutboxStore::new();
        let t0 = Utc::now() - Duration::minutes(10);
        // Inserted out of order on purpose
        let t3 = store
            .insert_at(new_record(), t0 + Duration::seconds(3))
            .await
            .unwrap();
        let t1 = store
            .insert_at(new_record(), t0 + Duration::seconds(1))
            .await
            .unwrap();
        let t2 = store
            .insert_at(new_record(), t0 + Duration::seconds(2))
            .await
            .unwrap();

        let claims = store.claim_batch(2).await.unwrap();
        let ids: Vec<i64> = claims.iter().map(|c| c.record().id).collect();

        assert_eq!(ids, vec![t1.id, t2.id]);
        assert!(!ids.contains(&t3.id));
    }

    #[tokio::test]
    async fn test_claimed_records_are_skipped() {
        let store = InMemoryOutboxStore::new();
        let a = store.insert(new_record()).await.unwrap();
        let b = store.insert(new_record()).await.unwrap();

        let first = store.claim_next(Utc::now()).await.unwrap().unwrap();
        let second = store.claim_next(Utc::now()).await.unwrap().unwrap();
        let third = store.claim_next(Utc::now()).await.unwrap();

        assert_eq!(first.record().id, a.id);
        assert_eq!(second.record().id, b.id);
        assert!(third.is_none());
        assert_eq!(store.locked_count(), 2);
    }

    #[tokio::test]
    async fn test_dropped_claim_releases_lock_without_changes() {
        let store = InMemoryOutboxStore::new();
        let a = store.insert(new_record()).await.unwrap();

        {
            let mut claim = store.claim_next(Utc::now()).await.unwrap().unwrap();
            claim.record_mut().mark_processed(Utc::now()).unwrap();
        }

        assert_eq!(store.locked_count(), 0);
        let stored = store.get(a.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OutboxStatus::Pending);

        let again = store.claim_next(Utc::now()).await.unwrap();
        assert_eq!(again.unwrap().record().id, a.id);
    }

    #[tokio::test]
    async fn test_claims_survive_a_poisoned_lock_set() {
        let store = InMemoryOutboxStore::new();
        let a = store.insert(new_record()).await.unwrap();
        let locked = Arc::clone(&store.locked);
        let _ = std::thread::spawn(move || {
            let _guard = locked.lock().unwrap();
            panic!("holder died");
        })
        .join();
        assert!(store.locked.is_poisoned());

        {
            let claim = store.claim_next(Utc::now()).await.unwrap().unwrap();
            assert_eq!(claim.record().id, a.id);
            assert_eq!(store.locked_count(), 1);
        }

        assert_eq!(store.locked_count(), 0);
        assert!(store.claim_next(Utc::now()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_save_persists_and_terminal_records_are_not_claimed() {
        let store = InMemoryOutboxStore::new();
        let a = store.insert(new_record()).await.unwrap();

        let mut claim = store.claim_next(Utc::now()).await.unwrap().unwrap();
        claim.record_mut().mark_processed(Utc::now()).unwrap();
        let saved = claim.save().await.unwrap();

        assert_eq!(saved.status, OutboxStatus::Processed);
        assert_eq!(store.locked_count(), 0);
        assert!(store.claim_next(Utc::now()).await.unwrap().is_none());
        assert_eq!(
            store.find_by_event_id(a.event_id).await.unwrap().unwrap().status,
            OutboxStatus::Processed
        );
    }

    #[tokio::test]
    async fn test_cutoff_skips_records_attempted_after_it() {
        let store = InMemoryOutboxStore::new();
        store.insert(new_record()).await.unwrap();
        let cutoff = Utc::now();

        let mut claim = store.claim_next(cutoff).await.unwrap().unwrap();
        claim
            .record_mut()
            .record_failed_attempt(cutoff + Duration::milliseconds(1), 5)
            .unwrap();
        claim.save().await.unwrap();

        assert!(store.claim_next(cutoff).await.unwrap().is_none());
        assert!(
            store
                .claim_next(cutoff + Duration::seconds(1))
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_list_and_count_by_status() {
        let store = InMemoryOutboxStore::new();
        for _ in 0..3 {
            store.insert(new_record()).await.unwrap();
        }
        let mut claim = store.claim_next(Utc::now()).await.unwrap().unwrap();
        claim.record_mut().record_failed_attempt(Utc::now(), 1).unwrap();
        claim.save().await.unwrap();

        assert_eq!(store.count_by_status(OutboxStatus::Pending).await.unwrap(), 2);
        assert_eq!(store.count_by_status(OutboxStatus::Failed).await.unwrap(), 1);
        assert_eq!(
            store
                .list_by_status(OutboxStatus::Pending, 1)
                .await
                .unwrap()
                .len(),
            1
        );
        assert!(!store.is_drained().await.unwrap());
    }
}
