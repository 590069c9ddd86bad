//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use api::{AppState, create_app, in_memory_state, postgres_state, spawn_dispatcher};
use bus::InMemoryMessageBus;
use metrics_exporter_prometheus::PrometheusHandle;
use notifications::NotificationStore;
use orders::OrderStore;
use outbox::OutboxStore;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

fn describe_metrics() {
    metrics::describe_counter!("orders_created_total", "Orders committed");
    metrics::describe_counter!(
        "outbox_records_staged_total",
        "Outbox records committed alongside an order"
    );
    metrics::describe_counter!(
        "outbox_events_published_total",
        "Outbox records acknowledged by the broker"
    );
    metrics::describe_counter!(
        "outbox_publish_failures_total",
        "Publish attempts that failed or timed out"
    );
    metrics::describe_counter!(
        "outbox_events_dead_lettered_total",
        "Outbox records that exhausted their retry budget"
    );
    metrics::describe_histogram!(
        "outbox_dispatch_cycle_seconds",
        "Duration of one dispatcher cycle"
    );
    metrics::describe_counter!(
        "notifications_events_processed_total",
        "Order events turned into notifications"
    );
    metrics::describe_counter!(
        "notifications_duplicate_events_total",
        "Redelivered order events ignored by the consumer"
    );
}

/// Serves the API and runs the dispatcher and the bus consumer until a
/// shutdown signal arrives.
async fn serve<O, N, S>(
    config: &Config,
    state: Arc<AppState<O, N>>,
    outbox: S,
    bus: InMemoryMessageBus,
    metrics_handle: PrometheusHandle,
) where
    O: OrderStore + 'static,
    N: NotificationStore + 'static,
    S: OutboxStore + 'static,
{
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = bus.spawn_consumer(
        InMemoryMessageBus::DEFAULT_REDELIVERY_INTERVAL,
        shutdown_rx.clone(),
    );
    let dispatcher = spawn_dispatcher(outbox, bus, config.dispatcher_config(), shutdown_rx);

    let app = create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // Let an in-flight cycle finish before exiting
    let _ = shutdown_tx.send(true);
    if let Err(e) = dispatcher.await {
        tracing::error!(error = %e, "dispatcher task failed");
    }
    if let Err(e) = consumer.await {
        tracing::error!(error = %e, "bus consumer task failed");
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");
    describe_metrics();

    // 3. Wire stores, bus and consumer
    let bus = InMemoryMessageBus::new();

    match config.database_url.as_deref() {
        Some(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .expect("failed to connect to PostgreSQL");
            let (state, outbox) = postgres_state(pool, &bus).await;
            outbox
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL stores");
            serve(&config, state, outbox, bus, metrics_handle).await;
        }
        None => {
            let (state, outbox) = in_memory_state(&bus).await;
            tracing::info!("DATABASE_URL not set, using in-memory stores");
            serve(&config, state, outbox, bus, metrics_handle).await;
        }
    }

    tracing::info!("server shut down gracefully");
}
