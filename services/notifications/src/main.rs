//! Notification service.
//!
//! Consumes the four order-lifecycle queues and emits a
//! `notification.sent` event for each, with the kind mapped per queue
//! and a symbolic `log` channel. Exposes `/health` and `/ready` probes.

mod config;
mod handler;

use axum::routing::get;
use axum::Router;
use config::Config;
use handler::NotificationHandler;
use orderline_core::payload::NotificationKind;
use orderline_core::topology::{self, queue, QueueBinding};
use orderline_postgres::{connect_pool, PostgresEventStore};
use orderline_redpanda::{ensure_topics, EventProducer, QueueWorker};
use orderline_runtime::readiness::{FnCheck, Readiness};
use orderline_runtime::retry::{reconnect_with_backoff, RetryPolicy};
use orderline_runtime::shutdown::{wait_for_signal, ShutdownCoordinator};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// The four subscriptions: queue, event type carried, notification kind.
const SUBSCRIPTIONS: &[(QueueBinding, &str, NotificationKind)] = &[
    (
        queue::ORDER_CREATED_NOTIFICATION,
        "orders.created",
        NotificationKind::OrderCreated,
    ),
    (
        queue::ORDERS_CANCELLED_NOTIFICATION,
        "orders.cancelled",
        NotificationKind::OrderCancelled,
    ),
    (
        queue::INVENTORY_APPROVED_NOTIFICATION,
        "inventory.reserve.approved",
        NotificationKind::OrderConfirmed,
    ),
    (
        queue::INVENTORY_REJECTED_NOTIFICATION,
        "inventory.reserve.rejected",
        NotificationKind::OrderRejected,
    ),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "orderline_notifications=info,orderline=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    info!(
        brokers = %config.brokers,
        database_url = %config.database_url,
        "starting notification service"
    );

    let reconnect = RetryPolicy::reconnect();
    let pool = reconnect_with_backoff("postgres", &reconnect, || {
        connect_pool(&config.database_url, config.db_max_connections)
    })
    .await;
    let event_store = Arc::new(PostgresEventStore::from_pool(pool.clone(), config.breaker()));
    event_store.run_migrations().await?;

    let producer = Arc::new(
        EventProducer::builder()
            .brokers(&config.brokers)
            .breaker(config.breaker())
            .build()?,
    );
    let topics = topology::all_topics();
    reconnect_with_backoff("broker", &reconnect, || {
        ensure_topics(&config.brokers, &topics)
    })
    .await;
    info!("broker topology declared");

    let readiness = {
        let ping_store = event_store.clone();
        let check_producer = producer.clone();
        let check_topic = config.readiness_check_topic.clone();
        let probe_timeout = config.readiness_timeout;
        Arc::new(
            Readiness::new(config.readiness_timeout)
                .register(FnCheck::new("database", move || {
                    let store = ping_store.clone();
                    async move { store.ping().await }
                }))
                .register(FnCheck::new("broker", move || {
                    let producer = check_producer.clone();
                    let topic = check_topic.clone();
                    async move { producer.check_topic(&topic, probe_timeout).await }
                })),
        )
    };

    let coordinator = ShutdownCoordinator::new(config.shutdown_timeout);

    let mut workers = Vec::new();
    for (binding, event_type, kind) in SUBSCRIPTIONS.iter().copied() {
        let handler = Arc::new(NotificationHandler::new(
            event_store.clone(),
            producer.clone(),
            config.service_name.clone(),
            event_type,
            kind,
        ));
        workers.push(
            QueueWorker::builder()
                .brokers(&config.brokers)
                .binding(binding)
                .publisher(producer.clone())
                .handler(handler)
                .max_retries(config.max_retries)
                .retry_delay(config.retry_delay)
                .shutdown(coordinator.subscribe())
                .connect()?
                .spawn(),
        );
    }
    info!(queues = SUBSCRIPTIONS.len(), "queue workers started");

    let app = Router::new()
        .route("/health", get(orderline_web::health::health))
        .route("/ready", get(orderline_web::health::ready))
        .with_state(readiness);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "probe endpoints listening");

    let mut http_shutdown = coordinator.subscribe();
    workers.push(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = http_shutdown.recv().await;
            })
            .await
        {
            tracing::error!(error = %e, "http server error");
        }
    }));

    wait_for_signal().await;
    coordinator.drain(workers).await;
    pool.close().await;
    info!("notification service stopped");

    Ok(())
}
