use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::OrderId;
use outbox::{InMemoryOutboxStore, OutboxRecord, OutboxStore};
use tokio::sync::RwLock;

use crate::{
    NewOrder, Order, OrderStatus, Page, Result,
    store::{EventStager, OrderStore},
};

/// In-memory order store for testing.
///
/// Writes its outbox records into a shared [`InMemoryOutboxStore`] so a
/// dispatcher can drain them. The order lock is held across the outbox
/// insert, which makes the pair atomic.
#[derive(Debug, Clone)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<Vec<Order>>>,
    outbox: InMemoryOutboxStore,
}

impl InMemoryOrderStore {
    /// Creates an empty order store writing to `outbox`.
    pub fn new(outbox: InMemoryOutboxStore) -> Self {
        Self {
            orders: Arc::new(RwLock::new(Vec::new())),
            outbox,
        }
    }

    /// Returns the outbox this store stages into.
    pub fn outbox(&self) -> &InMemoryOutboxStore {
        &self.outbox
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert_with_outbox(
        &self,
        order: NewOrder,
        stage: EventStager,
    ) -> Result<(Order, OutboxRecord)> {
        let mut orders = self.orders.write().await;

        let order = Order {
            id: OrderId::new(orders.len() as i64 + 1),
            customer_email: order.customer_email,
            product_code: order.product_code,
            quantity: order.quantity,
            status: OrderStatus::Created,
            created_at: Utc::now(),
        };

        let record = stage(&order)?;
        let staged = self.outbox.insert(record).await?;
        orders.push(order.clone());

        Ok((order, staged))
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        let orders = self.orders.read().await;
        Ok(orders.iter().find(|o| o.id == id).cloned())
    }

    async fn list(&self, page: u32, size: u32) -> Result<Page<Order>> {
        let orders = self.orders.read().await;
        let items = orders
            .iter()
            .skip(page as usize * size as usize)
            .take(size as usize)
            .cloned()
            .collect();
        Ok(Page::new(items, page, size, orders.len() as u64))
    }
}
