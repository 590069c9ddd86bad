//! Order service providing the write path and read queries.

use common::OrderId;
use outbox::{NewOutboxRecord, OutboxRecord};

use crate::store::{EventStager, OrderStore};
use crate::{CreateOrderRequest, Order, OrderError, Page, Result};

/// Largest page a listing may request.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Result of creating an order.
#[derive(Debug, Clone)]
pub struct CreateOrderResult {
    /// The persisted order.
    pub order: Order,
    /// The outbox record committed with it.
    pub staged: OutboxRecord,
}

/// Service for managing orders.
pub struct OrderService<S: OrderStore> {
    store: S,
}

impl<S: OrderStore> OrderService<S> {
    /// Creates a new order service with the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates an order and stages its `OrderCreated` event in the outbox.
    ///
    /// The order and its outbox record commit together or not at all.
    #[tracing::instrument(skip(self, request), fields(product_code = %request.product_code))]
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<CreateOrderResult> {
        let new_order = request.validate()?;

        let (order, staged) = self
            .store
            .insert_with_outbox(new_order, stage_order_created())
            .await
            .inspect_err(|e| tracing::error!(error = %e, "order creation rolled back"))?;

        metrics::counter!("orders_created_total").increment(1);
        metrics::counter!("outbox_records_staged_total").increment(1);
        tracing::info!(
            order_id = %order.id,
            event_id = %staged.event_id,
            "order created and event staged"
        );

        Ok(CreateOrderResult { order, staged })
    }

    /// Loads an order by id.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, id: OrderId) -> Result<Order> {
        self.store.get(id).await?.ok_or(OrderError::NotFound(id))
    }

    /// Lists orders, `size` per page, starting at zero-based `page`.
    #[tracing::instrument(skip(self))]
    pub async fn list_orders(&self, page: u32, size: u32) -> Result<Page<Order>> {
        if size == 0 || size > MAX_PAGE_SIZE {
            return Err(OrderError::InvalidPage(format!(
                "size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        self.store.list(page, size).await
    }
}

fn stage_order_created() -> EventStager {
    Box::new(|order: &Order| -> Result<NewOutboxRecord> {
        let event = order.created_event();
        Ok(NewOutboxRecord::from_event(&event)?)
    })
}
