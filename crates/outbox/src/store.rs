use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::EventId;

use crate::{NewOutboxRecord, OutboxRecord, OutboxStatus, Result};

/// A pending record locked for the exclusive use of one claimer.
///
/// The claim lives in its own short transaction. `save` persists the
/// record's current state and commits; dropping the claim without saving
/// rolls back and releases the lock so the record is claimable again.
#[async_trait]
pub trait ClaimedRecord: Send {
    fn record(&self) -> &OutboxRecord;

    fn record_mut(&mut self) -> &mut OutboxRecord;

    /// Persists the record and releases the claim.
    ///
    /// Fails with `InvalidTransition` if the stored row is no longer pending.
    async fn save(self) -> Result<OutboxRecord>;
}

/// Durable store of outbox records.
///
/// The store is the single owner of record lifecycle transitions. All
/// implementations must be safe to share between concurrent dispatchers.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    type Claim: ClaimedRecord;

    /// Inserts a record in its own transaction.
    ///
    /// Writers that need the record to commit together with other state use
    /// the store-specific transactional insert instead.
    async fn insert(&self, record: NewOutboxRecord) -> Result<OutboxRecord>;

    /// Claims the oldest pending record that is not locked by another claimer
    /// and whose last attempt happened before `cutoff`.
    ///
    /// Never blocks on rows held by other claimers; they are skipped.
    async fn claim_next(&self, cutoff: DateTime<Utc>) -> Result<Option<Self::Claim>>;

    /// Loads a record by its surrogate key.
    async fn get(&self, id: i64) -> Result<Option<OutboxRecord>>;

    /// Loads a record by its event id.
    async fn find_by_event_id(&self, event_id: EventId) -> Result<Option<OutboxRecord>>;

    /// Lists records in a given status, oldest first.
    async fn list_by_status(&self, status: OutboxStatus, limit: usize)
    -> Result<Vec<OutboxRecord>>;

    /// Counts records in a given status.
    async fn count_by_status(&self, status: OutboxStatus) -> Result<u64>;
}

/// Extension trait providing convenience methods for outbox stores.
#[async_trait]
pub trait OutboxStoreExt: OutboxStore {
    /// Claims up to `limit` pending records, oldest first.
    ///
    /// Every claim holds its own transaction until it is saved or dropped, so
    /// a PostgreSQL pool must have at least `limit` spare connections.
    async fn claim_batch(&self, limit: usize) -> Result<Vec<Self::Claim>> {
        let cutoff = Utc::now();
        let mut claims = Vec::with_capacity(limit);
        while claims.len() < limit {
            match self.claim_next(cutoff).await? {
                Some(claim) => claims.push(claim),
                None => break,
            }
        }
        Ok(claims)
    }

    /// Returns true when no record is waiting for delivery.
    async fn is_drained(&self) -> Result<bool> {
        Ok(self.count_by_status(OutboxStatus::Pending).await? == 0)
    }
}

// Blanket implementation for all OutboxStore implementations
impl<T: OutboxStore + ?Sized> OutboxStoreExt for T {}
