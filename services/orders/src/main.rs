//! Order service.
//!
//! Owns the order aggregate: HTTP order intake with idempotency keys,
//! eager cancellation, and consumers that apply inventory decisions to
//! the aggregate. Every produced and consumed event lands in the
//! service's event store.
//!
//! The idempotency map is in-process; see [`api`] for the multi-replica
//! caveat.

mod api;
mod config;
mod consumer;

use api::AppState;
use config::Config;
use consumer::StatusHandler;
use orderline_core::topology::{self, queue};
use orderline_postgres::{connect_pool, PostgresEventStore, PostgresOrderRepository};
use orderline_redpanda::{ensure_topics, EventProducer, QueueWorker};
use orderline_runtime::readiness::{FnCheck, Readiness};
use orderline_runtime::retry::{reconnect_with_backoff, RetryPolicy};
use orderline_runtime::shutdown::{wait_for_signal, ShutdownCoordinator};
use orderline_web::InMemoryIdempotencyStore;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "orderline_orders=info,orderline=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    info!(
        brokers = %config.brokers,
        database_url = %config.database_url,
        port = config.port,
        "starting order service"
    );

    // Startup blocks until both dependencies are reachable.
    let reconnect = RetryPolicy::reconnect();
    let pool = reconnect_with_backoff("postgres", &reconnect, || {
        connect_pool(&config.database_url, config.db_max_connections)
    })
    .await;
    let event_store = Arc::new(PostgresEventStore::from_pool(pool.clone(), config.breaker()));
    event_store.run_migrations().await?;
    let orders = Arc::new(PostgresOrderRepository::from_pool(
        pool.clone(),
        config.breaker(),
    ));

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
    workers.push(
        QueueWorker::builder()
            .brokers(&config.brokers)
            .binding(queue::INVENTORY_RESERVE_APPROVED)
            .publisher(producer.clone())
            .handler(Arc::new(StatusHandler::approved(
                orders.clone(),
                event_store.clone(),
            )))
            .max_retries(config.max_retries)
            .retry_delay(config.retry_delay)
            .shutdown(coordinator.subscribe())
            .connect()?
            .spawn(),
    );
    workers.push(
        QueueWorker::builder()
            .brokers(&config.brokers)
            .binding(queue::INVENTORY_RESERVE_REJECTED)
            .publisher(producer.clone())
            .handler(Arc::new(StatusHandler::rejected(
                orders.clone(),
                event_store.clone(),
            )))
            .max_retries(config.max_retries)
            .retry_delay(config.retry_delay)
            .shutdown(coordinator.subscribe())
            .connect()?
            .spawn(),
    );
    info!("queue workers started");

    let state = AppState {
        orders,
        store: event_store,
        publisher: producer,
        idempotency: Arc::new(InMemoryIdempotencyStore::new()),
        readiness,
        service_name: config.service_name.clone(),
        idempotency_ttl: config.idempotency_ttl,
    };
    let app = api::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "http server listening");

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
    info!("order service stopped");

    Ok(())
}
