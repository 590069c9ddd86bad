use async_trait::async_trait;
use common::OrderId;
use outbox::{OutboxRecord, insert_outbox_record};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{
    NewOrder, Order, Page, Result,
    store::{EventStager, OrderStore},
};

const ORDER_COLUMNS: &str = "id, customer_email, product_code, quantity, status, created_at";

/// PostgreSQL-backed order store.
///
/// Orders and their outbox records live in the same database, so one
/// transaction covers both.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let status: String = row.try_get("status")?;

        Ok(Order {
            id: OrderId::new(row.try_get("id")?),
            customer_email: row.try_get("customer_email")?,
            product_code: row.try_get("product_code")?,
            quantity: row.try_get("quantity")?,
            status: status.parse()?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn insert_with_outbox(
        &self,
        order: NewOrder,
        stage: EventStager,
    ) -> Result<(Order, OutboxRecord)> {
        // Dropping the transaction on any early return rolls both rows back
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "INSERT INTO orders (customer_email, product_code, quantity, status) \
             VALUES ($1, $2, $3, 'CREATED') RETURNING {ORDER_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(&order.customer_email)
            .bind(&order.product_code)
            .bind(order.quantity)
            .fetch_one(&mut *tx)
            .await?;
        let order = Self::row_to_order(row)?;

        let record = stage(&order)?;
        let staged = insert_outbox_record(&mut tx, &record).await?;

        tx.commit().await?;
        Ok((order, staged))
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn list(&self, page: u32, size: u32) -> Result<Page<Order>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await?;

        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY id ASC LIMIT $1 OFFSET $2");
        let rows = sqlx::query(&sql)
            .bind(i64::from(size))
            .bind(i64::from(page) * i64::from(size))
            .fetch_all(&self.pool)
            .await?;

        let items = rows
            .into_iter()
            .map(Self::row_to_order)
            .collect::<Result<Vec<_>>>()?;
        Ok(Page::new(items, page, size, total as u64))
    }
}
