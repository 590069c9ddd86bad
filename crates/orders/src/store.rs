use async_trait::async_trait;
use common::OrderId;
use outbox::{NewOutboxRecord, OutboxRecord};

use crate::{NewOrder, Order, Page, Result};

/// Builds the outbox record for a just-inserted order.
///
/// Runs inside the order's transaction; an error aborts the whole write.
pub type EventStager = Box<dyn FnOnce(&Order) -> Result<NewOutboxRecord> + Send>;

/// Persistence for orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts the order and the outbox record produced by `stage` as one
    /// atomic unit. Either both are committed or neither is.
    async fn insert_with_outbox(
        &self,
        order: NewOrder,
        stage: EventStager,
    ) -> Result<(Order, OutboxRecord)>;

    /// Loads an order by id.
    async fn get(&self, id: OrderId) -> Result<Option<Order>>;

    /// Lists orders by ascending id. `page` is zero-based.
    async fn list(&self, page: u32, size: u32) -> Result<Page<Order>>;
}
