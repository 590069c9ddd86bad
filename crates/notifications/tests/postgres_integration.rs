//! PostgreSQL integration tests for the idempotent consumer.
//!
//! Run with:
//!
//! ```bash
//! cargo test -p notifications --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;
use std::time::Duration;

use bus::InMemoryMessageBus;
use chrono::Utc;
use common::{EventId, OrderCreated, OrderId};
use notifications::{
    Channel, InMemorySender, LoggingSender, NewNotification, NotificationError, NotificationService,
    NotificationStore, OrderCreatedListener, PostgresNotificationStore, RecordOutcome,
    SeenEventClaim,
};
use outbox::{
    DispatcherConfig, NewOutboxRecord, OutboxDispatcher, OutboxStore, PostgresOutboxStore,
};
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

async fn get_test_pool() -> PgPool {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE notifications, seen_events, outbox_events RESTART IDENTITY")
        .execute(&pool)
        .await
        .unwrap();

    pool
}

fn order_created(order_id: i64) -> OrderCreated {
    OrderCreated {
        event_id: EventId::new(),
        occurred_at: Utc::now(),
        order_id: OrderId::new(order_id),
        customer_email: "jane@example.com".to_string(),
        product_code: "SKU-001".to_string(),
        quantity: 2,
    }
}

fn notifications_for(event: &OrderCreated) -> Vec<NewNotification> {
    Channel::ALL
        .into_iter()
        .map(|channel| NewNotification::sent(event.event_id, event.order_id, channel))
        .collect()
}

#[tokio::test]
async fn record_once_writes_seen_marker_and_notifications() {
    let store = PostgresNotificationStore::new(get_test_pool().await);
    let event = order_created(1);

    let outcome = store
        .record_once(event.event_id, notifications_for(&event))
        .await
        .unwrap();

    let RecordOutcome::Applied(stored) = outcome else {
        panic!("expected applied");
    };
    assert_eq!(stored.len(), 3);
    assert!(store.has_seen(event.event_id).await.unwrap());
    assert_eq!(store.get(stored[0].id).await.unwrap().unwrap(), stored[0]);
}

#[tokio::test]
async fn second_record_for_same_event_is_a_no_op() {
    let store = PostgresNotificationStore::new(get_test_pool().await);
    let event = order_created(1);
    store
        .record_once(event.event_id, notifications_for(&event))
        .await
        .unwrap();

    let outcome = store
        .record_once(event.event_id, notifications_for(&event))
        .await
        .unwrap();

    assert!(outcome.is_duplicate());
    assert_eq!(store.list_all().await.unwrap().len(), 3);
}

#[tokio::test]
async fn concurrent_record_once_applies_exactly_one() {
    let store = PostgresNotificationStore::new(get_test_pool().await);
    let event = order_created(1);

    let mut handles = Vec::new();
    for _ in 0..5 {
        let store = store.clone();
        let event = event.clone();
        handles.push(tokio::spawn(async move {
            store
                .record_once(event.event_id, notifications_for(&event))
                .await
                .unwrap()
        }));
    }
    let outcomes = futures_util::future::join_all(handles).await;

    let applied = outcomes
        .into_iter()
        .map(|r| r.unwrap())
        .filter(|o| !o.is_duplicate())
        .count();
    assert_eq!(applied, 1);
    assert_eq!(
        store
            .find_by_order_id(OrderId::new(1))
            .await
            .unwrap()
            .len(),
        3
    );
}

#[tokio::test]
async fn rolled_back_claim_leaves_event_unseen() {
    let store = PostgresNotificationStore::new(get_test_pool().await);
    let event = order_created(1);

    let claim = store.claim_event(event.event_id).await.unwrap();
    assert!(claim.is_some());
    drop(claim);

    assert!(!store.has_seen(event.event_id).await.unwrap());
    let claim = store.claim_event(event.event_id).await.unwrap().unwrap();
    claim.commit(notifications_for(&event)).await.unwrap();
    assert!(store.claim_event(event.event_id).await.unwrap().is_none());
}

#[tokio::test]
async fn concurrent_deliveries_send_each_channel_once() {
    let sender = InMemorySender::new();
    sender.set_latency(Some(Duration::from_millis(20))).await;
    let service = Arc::new(NotificationService::new(
        PostgresNotificationStore::new(get_test_pool().await),
        sender,
    ));
    let event = order_created(1);

    let mut handles = Vec::new();
    for _ in 0..4 {
        let service = service.clone();
        let event = event.clone();
        handles.push(tokio::spawn(async move {
            service.process_order_created(&event).await.unwrap()
        }));
    }
    let outcomes = futures_util::future::join_all(handles).await;

    let applied = outcomes
        .into_iter()
        .map(|r| r.unwrap())
        .filter(|o| !o.is_duplicate())
        .count();
    assert_eq!(applied, 1);
    assert_eq!(service.sender().sent_count().await, 3);
    assert_eq!(service.list_notifications().await.unwrap().len(), 3);
}

#[tokio::test]
async fn empty_order_lookup_is_not_found() {
    let store = PostgresNotificationStore::new(get_test_pool().await);
    let service = NotificationService::new(store, LoggingSender);

    let result = service.notifications_for_order(OrderId::new(77)).await;
    assert!(matches!(result, Err(NotificationError::NotFound(_))));
}

#[tokio::test]
async fn redelivered_event_produces_one_set_of_notifications() {
    let pool = get_test_pool().await;
    let outbox = PostgresOutboxStore::new(pool.clone());
    let service = Arc::new(NotificationService::new(
        PostgresNotificationStore::new(pool),
        LoggingSender,
    ));
    let bus = InMemoryMessageBus::new();
    bus.subscribe(Arc::new(OrderCreatedListener::new(service.clone())))
        .await;

    let event = order_created(5);
    outbox
        .insert(NewOutboxRecord::from_event(&event).unwrap())
        .await
        .unwrap();
    let dispatcher = OutboxDispatcher::new(outbox, bus.clone(), DispatcherConfig::default());
    dispatcher.run_cycle().await.unwrap();

    assert_eq!(bus.deliver_pending().await, 1);
    bus.redeliver_all().await;

    let notifications = service
        .notifications_for_order(OrderId::new(5))
        .await
        .unwrap();
    assert_eq!(notifications.len(), 3);
    assert!(notifications.iter().all(|n| n.event_id == event.event_id));
}
