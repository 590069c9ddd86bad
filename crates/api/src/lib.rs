//! HTTP API server for the order outbox system.
//!
//! Hosts the order write path, the outbox dispatcher loop and the
//! notification consumer in one process, with structured logging (tracing)
//! and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use bus::{InMemoryMessageBus, MessageBus};
use metrics_exporter_prometheus::PrometheusHandle;
use notifications::{
    InMemoryNotificationStore, LoggingSender, NotificationService, NotificationStore,
    OrderCreatedListener, PostgresNotificationStore,
};
use orders::{InMemoryOrderStore, OrderService, OrderStore, PostgresOrderStore};
use outbox::{DispatcherConfig, InMemoryOutboxStore, OutboxDispatcher, OutboxStore, PostgresOutboxStore};
use sqlx::PgPool;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<O: OrderStore, N: NotificationStore> {
    pub orders: OrderService<O>,
    pub notifications: Arc<NotificationService<N, LoggingSender>>,
}

impl<O: OrderStore, N: NotificationStore> AppState<O, N> {
    pub fn new(order_store: O, notification_store: N) -> Self {
        Self {
            orders: OrderService::new(order_store),
            notifications: Arc::new(NotificationService::new(notification_store, LoggingSender)),
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<O, N>(state: Arc<AppState<O, N>>, metrics_handle: PrometheusHandle) -> Router
where
    O: OrderStore + 'static,
    N: NotificationStore + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::system::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::system::health))
        .route(
            "/orders",
            get(routes::orders::list::<O, N>).post(routes::orders::create::<O, N>),
        )
        .route("/orders/{id}", get(routes::orders::get::<O, N>))
        .route("/notifications", get(routes::notifications::list::<O, N>))
        .route("/notifications/{id}", get(routes::notifications::get::<O, N>))
        .route(
            "/notifications/order/{order_id}",
            get(routes::notifications::by_order::<O, N>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Subscribes the order-created listener of `state` to `bus`.
pub async fn subscribe_notifications<O, N>(bus: &InMemoryMessageBus, state: &AppState<O, N>)
where
    O: OrderStore,
    N: NotificationStore + 'static,
{
    bus.subscribe(Arc::new(OrderCreatedListener::new(
        state.notifications.clone(),
    )))
    .await;
}

/// Builds in-memory state wired to `bus`, returning the outbox to drain.
pub async fn in_memory_state(
    bus: &InMemoryMessageBus,
) -> (
    Arc<AppState<InMemoryOrderStore, InMemoryNotificationStore>>,
    InMemoryOutboxStore,
) {
    let outbox = InMemoryOutboxStore::new();
    let state = Arc::new(AppState::new(
        InMemoryOrderStore::new(outbox.clone()),
        InMemoryNotificationStore::new(),
    ));
    subscribe_notifications(bus, &state).await;
    (state, outbox)
}

/// Builds PostgreSQL-backed state wired to `bus`, returning the outbox to drain.
pub async fn postgres_state(
    pool: PgPool,
    bus: &InMemoryMessageBus,
) -> (
    Arc<AppState<PostgresOrderStore, PostgresNotificationStore>>,
    PostgresOutboxStore,
) {
    let state = Arc::new(AppState::new(
        PostgresOrderStore::new(pool.clone()),
        PostgresNotificationStore::new(pool.clone()),
    ));
    subscribe_notifications(bus, &state).await;
    (state, PostgresOutboxStore::new(pool))
}

/// Spawns the dispatcher loop; it stops once `shutdown` turns true.
pub fn spawn_dispatcher<S, B>(
    store: S,
    bus: B,
    config: DispatcherConfig,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    S: OutboxStore + 'static,
    B: MessageBus + 'static,
{
    tokio::spawn(async move {
        OutboxDispatcher::new(store, bus, config)
            .run(shutdown)
            .await;
    })
}
