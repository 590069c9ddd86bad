//! PostgreSQL integration tests for the order write path.
//!
//! Run with:
//!
//! ```bash
//! cargo test -p orders --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use common::{OrderCreated, OrderId};
use orders::{
    CreateOrderRequest, EventStager, Order, OrderError, OrderService, OrderStore,
    PostgresOrderStore, Result,
};
use outbox::{NewOutboxRecord, OutboxError, OutboxStatus, OutboxStore, PostgresOutboxStore};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            PostgresOutboxStore::new(temp_pool.clone())
                .run_migrations()
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_stores() -> (PostgresOrderStore, PostgresOutboxStore) {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE outbox_events, orders RESTART IDENTITY")
        .execute(&pool)
        .await
        .unwrap();

    (
        PostgresOrderStore::new(pool.clone()),
        PostgresOutboxStore::new(pool),
    )
}

fn request() -> CreateOrderRequest {
    CreateOrderRequest::new("jane@example.com", "SKU-001", 2)
}

#[tokio::test]
async fn created_order_commits_with_one_pending_record() {
    let (orders, outbox) = get_test_stores().await;
    let service = OrderService::new(orders);

    let created = service.create_order(request()).await.unwrap();

    let loaded = service.get_order(created.order.id).await.unwrap();
    assert_eq!(loaded.customer_email, "jane@example.com");
    assert_eq!(loaded.quantity, 2);

    let record = outbox
        .find_by_event_id(created.staged.event_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, OutboxStatus::Pending);
    let event: OrderCreated = serde_json::from_str(&record.payload).unwrap();
    assert_eq!(event.order_id, created.order.id);
    assert_eq!(outbox.count_by_status(OutboxStatus::Pending).await.unwrap(), 1);
}

#[tokio::test]
async fn failing_stager_rolls_back_the_order() {
    let (orders, outbox) = get_test_stores().await;

    let stage: EventStager = Box::new(|_: &Order| -> Result<NewOutboxRecord> {
        Err(OrderError::Outbox(OutboxError::UnknownEventType(
            "BROKEN".to_string(),
        )))
    });
    let new_order = request().validate().unwrap();
    let result = orders.insert_with_outbox(new_order, stage).await;

    assert!(result.is_err());
    let page = orders.list(0, 10).await.unwrap();
    assert_eq!(page.total_elements, 0);
    assert_eq!(outbox.count_by_status(OutboxStatus::Pending).await.unwrap(), 0);
}

#[tokio::test]
async fn duplicate_event_id_rolls_back_the_second_order() {
    let (orders, outbox) = get_test_stores().await;
    let first = OrderService::new(orders.clone())
        .create_order(request())
        .await
        .unwrap();

    let reused = first.staged.event_id;
    let stage: EventStager = Box::new(move |order: &Order| -> Result<NewOutboxRecord> {
        let mut event = order.created_event();
        event.event_id = reused;
        Ok(NewOutboxRecord::from_event(&event)?)
    });
    let result = orders
        .insert_with_outbox(request().validate().unwrap(), stage)
        .await;

    assert!(matches!(
        result,
        Err(OrderError::Outbox(OutboxError::DuplicateEventId(_)))
    ));
    assert_eq!(orders.list(0, 10).await.unwrap().total_elements, 1);
    assert_eq!(outbox.count_by_status(OutboxStatus::Pending).await.unwrap(), 1);
}

#[tokio::test]
async fn list_pages_by_ascending_id() {
    let (orders, _) = get_test_stores().await;
    let service = OrderService::new(orders);
    for _ in 0..5 {
        service.create_order(request()).await.unwrap();
    }

    let first = service.list_orders(0, 2).await.unwrap();
    let last = service.list_orders(2, 2).await.unwrap();

    assert_eq!(first.total_elements, 5);
    assert_eq!(first.total_pages, 3);
    let ids: Vec<OrderId> = first.items.iter().map(|o| o.id).collect();
    assert_eq!(ids, vec![OrderId::new(1), OrderId::new(2)]);
    assert_eq!(last.items.len(), 1);
    assert!(last.is_last());
}

#[tokio::test]
async fn missing_order_is_not_found() {
    let (orders, _) = get_test_stores().await;
    let service = OrderService::new(orders);

    let result = service.get_order(OrderId::new(404)).await;
    assert!(matches!(result, Err(OrderError::NotFound(_))));
}
