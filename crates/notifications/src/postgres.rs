use async_trait::async_trait;
use common::{EventId, OrderId};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    NewNotification, Notification, Result,
    store::{NotificationStore, SeenEventClaim},
};

const NOTIFICATION_COLUMNS: &str =
    "id, event_id, order_id, type, channel, delivered, message, created_at";

/// PostgreSQL-backed notification store.
#[derive(Clone)]
pub struct PostgresNotificationStore {
    pool: PgPool,
}

impl PostgresNotificationStore {
    /// Creates a new PostgreSQL notification store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_notification(row: PgRow) -> Result<Notification> {
        let notification_type: String = row.try_get("type")?;
        let channel: String = row.try_get("channel")?;

        Ok(Notification {
            id: row.try_get("id")?,
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("event_id")?),
            order_id: OrderId::new(row.try_get("order_id")?),
            notification_type: notification_type.parse()?,
            channel: channel.parse()?,
            delivered: row.try_get("delivered")?,
            message: row.try_get("message")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Open transaction holding a freshly inserted `seen_events` row.
///
/// Dropping it rolls the row back.
pub struct PgSeenEventClaim {
    event_id: EventId,
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl SeenEventClaim for PgSeenEventClaim {
    fn event_id(&self) -> EventId {
        self.event_id
    }

    async fn commit(mut self, notifications: Vec<NewNotification>) -> Result<Vec<Notification>> {
        let sql = format!(
            "INSERT INTO notifications (event_id, order_id, type, channel, delivered, message) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {NOTIFICATION_COLUMNS}"
        );
        let mut stored = Vec::with_capacity(notifications.len());
        for new in &notifications {
            let row = sqlx::query(&sql)
                .bind(new.event_id.as_uuid())
                .bind(new.order_id.as_i64())
                .bind(new.notification_type.as_str())
                .bind(new.channel.as_str())
                .bind(new.delivered)
                .bind(&new.message)
                .fetch_one(&mut *self.tx)
                .await?;
            stored.push(PostgresNotificationStore::row_to_notification(row)?);
        }

        self.tx.commit().await?;
        Ok(stored)
    }
}

#[async_trait]
impl NotificationStore for PostgresNotificationStore {
    type Claim = PgSeenEventClaim;

    async fn has_seen(&self, event_id: EventId) -> Result<bool> {
        let seen: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM seen_events WHERE event_id = $1)")
                .bind(event_id.as_uuid())
                .fetch_one(&self.pool)
                .await?;
        Ok(seen)
    }

    async fn claim_event(&self, event_id: EventId) -> Result<Option<Self::Claim>> {
        let mut tx = self.pool.begin().await?;

        // A concurrent claim on the same id blocks here until the first
        // transaction ends, then sees the conflict if it committed
        let inserted = sqlx::query(
            "INSERT INTO seen_events (event_id) VALUES ($1) ON CONFLICT (event_id) DO NOTHING",
        )
        .bind(event_id.as_uuid())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        Ok(Some(PgSeenEventClaim { event_id, tx }))
    }

    async fn get(&self, id: i64) -> Result<Option<Notification>> {
        let sql = format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_notification).transpose()
    }

    async fn list_all(&self) -> Result<Vec<Notification>> {
        let sql = format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications ORDER BY id ASC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        rows.into_iter().map(Self::row_to_notification).collect()
    }

    async fn find_by_order_id(&self, order_id: OrderId) -> Result<Vec<Notification>> {
        let sql = format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE order_id = $1 ORDER BY id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(order_id.as_i64())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_notification).collect()
    }
}
