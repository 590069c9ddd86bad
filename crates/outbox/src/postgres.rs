use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::EventId;
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    NewOutboxRecord, OutboxError, OutboxRecord, OutboxStatus, Result,
    store::{ClaimedRecord, OutboxStore},
};

const RECORD_COLUMNS: &str = "id, event_id, event_type, payload, status, created_at, updated_at, processed_at, retry_count, last_attempt_at";

/// PostgreSQL-backed outbox store.
#[derive(Clone)]
pub struct PostgresOutboxStore {
    pool: PgPool,
}

impl PostgresOutboxStore {
    /// Creates a new PostgreSQL outbox store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Inserts an outbox record on an open connection.
///
/// Pass a transaction to make the record commit or roll back together with
/// the caller's business write.
pub async fn insert_outbox_record(
    conn: &mut PgConnection,
    record: &NewOutboxRecord,
) -> Result<OutboxRecord> {
    let sql = format!(
        "INSERT INTO outbox_events (event_id, event_type, payload, status) \
         VALUES ($1, $2, $3, 'PENDING') RETURNING {RECORD_COLUMNS}"
    );

    let row = sqlx::query(&sql)
        .bind(record.event_id.as_uuid())
        .bind(&record.event_type)
        .bind(&record.payload)
        .fetch_one(conn)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("unique_outbox_event_id")
            {
                return OutboxError::DuplicateEventId(record.event_id);
            }
            OutboxError::Database(e)
        })?;

    row_to_record(row)
}

fn row_to_record(row: PgRow) -> Result<OutboxRecord> {
    let status: String = row.try_get("status")?;
    let retry_count: i32 = row.try_get("retry_count")?;

    Ok(OutboxRecord {
        id: row.try_get("id")?,
        event_id: EventId::from_uuid(row.try_get::<Uuid, _>("event_id")?),
        event_type: row.try_get("event_type")?,
        payload: row.try_get("payload")?,
        status: status.parse()?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        processed_at: row.try_get("processed_at")?,
        retry_count: retry_count.max(0) as u32,
        last_attempt_at: row.try_get("last_attempt_at")?,
    })
}

/// A record claimed with `FOR UPDATE SKIP LOCKED`.
///
/// The row lock lives as long as the wrapped transaction.
pub struct PgClaimedRecord {
    tx: Transaction<'static, Postgres>,
    record: OutboxRecord,
}

#[async_trait]
impl ClaimedRecord for PgClaimedRecord {
    fn record(&self) -> &OutboxRecord {
        &self.record
    }

    fn record_mut(&mut self) -> &mut OutboxRecord {
        &mut self.record
    }

    async fn save(mut self) -> Result<OutboxRecord> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = $2, updated_at = $3, processed_at = $4, retry_count = $5, last_attempt_at = $6
            WHERE id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(self.record.id)
        .bind(self.record.status.as_str())
        .bind(self.record.updated_at)
        .bind(self.record.processed_at)
        .bind(self.record.retry_count as i32)
        .bind(self.record.last_attempt_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OutboxError::InvalidTransition {
                id: self.record.id,
                status: self.record.status,
            });
        }

        self.tx.commit().await?;
        Ok(self.record)
    }
}

#[async_trait]
impl OutboxStore for PostgresOutboxStore {
    type Claim = PgClaimedRecord;

    async fn insert(&self, record: NewOutboxRecord) -> Result<OutboxRecord> {
        let mut conn = self.pool.acquire().await?;
        insert_outbox_record(&mut conn, &record).await
    }

    async fn claim_next(&self, cutoff: DateTime<Utc>) -> Result<Option<Self::Claim>> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM outbox_events \
             WHERE status = 'PENDING' AND (last_attempt_at IS NULL OR last_attempt_at < $1) \
             ORDER BY created_at ASC, id ASC \
             LIMIT 1 \
             FOR UPDATE SKIP LOCKED"
        );
        let row: Option<PgRow> = sqlx::query(&sql)
            .bind(cutoff)
            .fetch_optional(&mut *tx)
            .await?;

        match row {
            Some(row) => Ok(Some(PgClaimedRecord {
                tx,
                record: row_to_record(row)?,
            })),
            None => {
                tx.rollback().await?;
                Ok(None)
            }
        }
    }

    async fn get(&self, id: i64) -> Result<Option<OutboxRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM outbox_events WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_record).transpose()
    }

    async fn find_by_event_id(&self, event_id: EventId) -> Result<Option<OutboxRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM outbox_events WHERE event_id = $1");
        let row = sqlx::query(&sql)
            .bind(event_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_record).transpose()
    }

    async fn list_by_status(
        &self,
        status: OutboxStatus,
        limit: usize,
    ) -> Result<Vec<OutboxRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM outbox_events \
             WHERE status = $1 ORDER BY created_at ASC, id ASC LIMIT $2"
        );
        let rows = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(row_to_record).collect()
    }

    async fn count_by_status(&self, status: OutboxStatus) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM outbox_events WHERE status = $1")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(count as u64)
    }
}
