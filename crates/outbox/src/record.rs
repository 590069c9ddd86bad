use chrono::{DateTime, Utc};
use common::{EventId, OutboxEvent};
use serde::{Deserialize, Serialize};

use crate::{OutboxError, Result};

/// Delivery state of an outbox record.
///
/// `Pending` is the only non-terminal state. A record leaves it exactly once,
/// either to `Processed` after an acknowledged publish or to `Failed` once
/// its retries are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    Pending,
    Processed,
    Failed,
}

impl OutboxStatus {
    /// Returns the value stored in the `status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processed => "PROCESSED",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OutboxStatus {
    type Err = OutboxError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PROCESSED" => Ok(Self::Processed),
            "FAILED" => Ok(Self::Failed),
            other => Err(OutboxError::UnknownStatus(other.to_string())),
        }
    }
}

/// An event staged for delivery, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOutboxRecord {
    pub event_id: EventId,
    pub event_type: String,
    pub payload: String,
}

impl NewOutboxRecord {
    pub fn new(event_id: EventId, event_type: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            event_id,
            event_type: event_type.into(),
            payload: payload.into(),
        }
    }

    /// Serializes `event` into a record tagged with its event type.
    pub fn from_event<E: OutboxEvent>(event: &E) -> Result<Self> {
        let payload = serde_json::to_string(event)?;
        Ok(Self::new(event.event_id(), E::EVENT_TYPE, payload))
    }
}

/// A persisted outbox record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboxRecord {
    /// Surrogate key assigned by the store.
    pub id: i64,
    pub event_id: EventId,
    pub event_type: String,
    /// Serialized event body, opaque to the store.
    pub payload: String,
    pub status: OutboxStatus,
    /// Set once on insert; defines dispatch order.
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl OutboxRecord {
    /// Records an acknowledged publish.
    pub fn mark_processed(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_pending()?;
        self.status = OutboxStatus::Processed;
        self.processed_at = Some(now);
        self.last_attempt_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Records a failed publish attempt and returns the resulting status.
    ///
    /// The record moves to `Failed` once `retry_count` reaches
    /// `max_retry_attempts`; otherwise it stays `Pending`.
    pub fn record_failed_attempt(
        &mut self,
        now: DateTime<Utc>,
        max_retry_attempts: u32,
    ) -> Result<OutboxStatus> {
        self.ensure_pending()?;
        self.retry_count += 1;
        self.last_attempt_at = Some(now);
        self.updated_at = now;
        if self.retry_count >= max_retry_attempts {
            self.status = OutboxStatus::Failed;
        }
        Ok(self.status)
    }

    /// Moves a pending record whose retry budget is already spent to
    /// `Failed` without counting another attempt.
    pub fn mark_dead_lettered(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_pending()?;
        self.status = OutboxStatus::Failed;
        self.updated_at = now;
        Ok(())
    }

    pub fn retries_exhausted(&self, max_retry_attempts: u32) -> bool {
        self.retry_count >= max_retry_attempts
    }

    pub fn is_pending(&self) -> bool {
        self.status == OutboxStatus::Pending
    }

    fn ensure_pending(&self) -> Result<()> {
        if self.status.is_terminal() {
            return Err(OutboxError::InvalidTransition {
                id: self.id,
                status: self.status,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_record() -> OutboxRecord {
        let now = Utc::now();
        OutboxRecord {
            id: 1,
            event_id: EventId::new(),
            event_type: "ORDER".to_string(),
            payload: "{}".to_string(),
            status: OutboxStatus::Pending,
            created_at: now,
            updated_at: now,
            processed_at: None,
            retry_count: 0,
            last_attempt_at: None,
        }
    }

    #[test]
    fn test_status_parses_column_values() {
        for status in [
            OutboxStatus::Pending,
            OutboxStatus::Processed,
            OutboxStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<OutboxStatus>().unwrap(), status);
        }
        assert!("DONE".parse::<OutboxStatus>().is_err());
    }

    #[test]
    fn test_mark_processed_sets_timestamps() {
        let mut record = pending_record();
        let now = Utc::now();

        record.mark_processed(now).unwrap();

        assert_eq!(record.status, OutboxStatus::Processed);
        assert_eq!(record.processed_at, Some(now));
        assert_eq!(record.last_attempt_at, Some(now));
        assert_eq!(record.updated_at, now);
        assert_eq!(record.retry_count, 0);
    }

    #[test]
    fn test_failed_attempts_stay_pending_below_cap() {
        let mut record = pending_record();

        for expected in 1..5 {
            let status = record.record_failed_attempt(Utc::now(), 5).unwrap();
            assert_eq!(status, OutboxStatus::Pending);
            assert_eq!(record.retry_count, expected);
        }
        assert!(record.last_attempt_at.is_some());
        assert!(record.processed_at.is_none());
    }

    #[test]
    fn test_failed_attempt_at_cap_dead_letters() {
        let mut record = pending_record();
        record.retry_count = 4;

        let status = record.record_failed_attempt(Utc::now(), 5).unwrap();

        assert_eq!(status, OutboxStatus::Failed);
        assert_eq!(record.retry_count, 5);
    }

    #[test]
    fn test_dead_letter_keeps_retry_count() {
        let mut record = pending_record();
        record.retry_count = 3;
        assert!(record.retries_exhausted(2));
        assert!(!record.retries_exhausted(5));

        record.mark_dead_lettered(Utc::now()).unwrap();

        assert_eq!(record.status, OutboxStatus::Failed);
        assert_eq!(record.retry_count, 3);
        assert!(record.processed_at.is_none());
        assert!(record.mark_dead_lettered(Utc::now()).is_err());
    }

    #[test]
    fn test_terminal_records_refuse_transitions() {
        let mut processed = pending_record();
        processed.mark_processed(Utc::now()).unwrap();
        assert!(matches!(
            processed.record_failed_attempt(Utc::now(), 5),
            Err(OutboxError::InvalidTransition { .. })
        ));
        assert!(processed.mark_processed(Utc::now()).is_err());

        let mut failed = pending_record();
        failed.record_failed_attempt(Utc::now(), 1).unwrap();
        assert_eq!(failed.status, OutboxStatus::Failed);
        assert!(failed.mark_processed(Utc::now()).is_err());
        assert_eq!(failed.retry_count, 1);
    }

    #[test]
    fn test_new_record_from_event_uses_type_and_id() {
        let event = common::OrderCreated {
            event_id: EventId::new(),
            occurred_at: Utc::now(),
            order_id: common::OrderId::new(1),
            customer_email: "a@b.io".to_string(),
            product_code: "SKU".to_string(),
            quantity: 1,
        };

        let record = NewOutboxRecord::from_event(&event).unwrap();

        assert_eq!(record.event_id, event.event_id);
        assert_eq!(record.event_type, "ORDER");
        let decoded: common::OrderCreated = serde_json::from_str(&record.payload).unwrap();
        assert_eq!(decoded, event);
    }
}
