//! `PostgreSQL` persistence for Orderline.
//!
//! This crate implements the two persistence seams from `orderline-core`
//! over sqlx:
//!
//! - [`PostgresEventStore`]: the append-only event store, deduplicated by
//!   `eventId` (the unique index makes the duplicate-key case the happy
//!   path under at-least-once delivery)
//! - [`PostgresOrderRepository`]: the order aggregate read-model
//!   (in [`orders`])
//!
//! Writes run through a DB circuit breaker; an open breaker surfaces as a
//! transient error the caller maps into a consumer retry or an HTTP 5xx.
//!
//! # Example
//!
//! ```no_run
//! use orderline_postgres::{connect_pool, PostgresEventStore};
//! use orderline_runtime::circuit_breaker::CircuitBreakerConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = connect_pool("postgres://localhost/orders", 5).await?;
//! let store = PostgresEventStore::from_pool(pool, CircuitBreakerConfig::default());
//! store.run_migrations().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod orders;

pub use orders::PostgresOrderRepository;

use async_trait::async_trait;
use orderline_core::envelope::EventEnvelope;
use orderline_core::store::{Appended, EventFilter, EventStore, EventStoreError};
use orderline_runtime::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{QueryBuilder, Row};
use uuid::Uuid;

/// Create a connection pool for a service database.
///
/// # Errors
///
/// Returns [`EventStoreError::DatabaseError`] when the URL is invalid or
/// the database is unreachable.
pub async fn connect_pool(database_url: &str, max_connections: u32) -> Result<PgPool, EventStoreError> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(|e| EventStoreError::DatabaseError(e.to_string()))
}

pub(crate) fn map_breaker_error<E>(err: CircuitBreakerError<E>) -> EventStoreError
where
    E: Into<EventStoreError>,
{
    match err {
        CircuitBreakerError::Open => EventStoreError::CircuitOpen,
        CircuitBreakerError::Timeout(d) => {
            EventStoreError::DatabaseError(format!("query timed out after {d:?}"))
        }
        CircuitBreakerError::Inner(e) => e.into(),
    }
}

/// `PostgreSQL`-backed event store with idempotent append.
pub struct PostgresEventStore {
    pool: PgPool,
    breaker: CircuitBreaker,
}

impl PostgresEventStore {
    /// Create an event store over an existing pool, with the given DB
    /// circuit breaker configuration guarding writes.
    #[must_use]
    pub fn from_pool(pool: PgPool, breaker: CircuitBreakerConfig) -> Self {
        Self {
            pool,
            breaker: CircuitBreaker::new("db", breaker),
        }
    }

    /// Get a reference to the underlying connection pool.
    ///
    /// Useful for readiness pings and sharing the pool with the order
    /// repository.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run the embedded sqlx migrations.
    ///
    /// Idempotent: already-applied migrations are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::DatabaseError`] if a migration fails.
    pub async fn run_migrations(&self) -> Result<(), EventStoreError> {
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| EventStoreError::DatabaseError(format!("migration failed: {e}")))?;
        tracing::info!("database migrations completed");
        Ok(())
    }

    /// Readiness probe: round-trip a trivial query.
    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    async fn insert(&self, envelope: &EventEnvelope) -> Result<Appended, EventStoreError> {
        let version = i32::try_from(envelope.version)
            .map_err(|e| EventStoreError::SerializationError(format!("version overflow: {e}")))?;

        let result = sqlx::query(
            r"
            INSERT INTO events
                (event_id, event_type, version, occurred_at, producer, correlation_id, order_id, payload)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (event_id) DO NOTHING
            ",
        )
        .bind(envelope.event_id)
        .bind(&envelope.event_type)
        .bind(version)
        .bind(envelope.occurred_at)
        .bind(&envelope.producer)
        .bind(&envelope.correlation_id)
        .bind(envelope.order_id())
        .bind(&envelope.payload)
        .execute(&self.pool)
        .await
        .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;

        if result.rows_affected() == 0 {
            tracing::debug!(
                event_id = %envelope.event_id,
                event_type = %envelope.event_type,
                "duplicate eventId, append deduplicated"
            );
            metrics::counter!("event_store.append.total", "result" => "deduplicated").increment(1);
            Ok(Appended::Deduplicated)
        } else {
            metrics::counter!("event_store.append.total", "result" => "inserted").increment(1);
            Ok(Appended::Inserted)
        }
    }
}

fn row_to_envelope(row: &PgRow) -> Result<EventEnvelope, EventStoreError> {
    let version: i32 = row.get("version");
    Ok(EventEnvelope {
        event_id: row.get("event_id"),
        event_type: row.get("event_type"),
        version: u32::try_from(version)
            .map_err(|e| EventStoreError::SerializationError(format!("negative version: {e}")))?,
        occurred_at: row.get("occurred_at"),
        producer: row.get("producer"),
        correlation_id: row.get("correlation_id"),
        payload: row.get("payload"),
    })
}

const SELECT_ENVELOPE: &str = "SELECT event_id, event_type, version, occurred_at, producer, \
                               correlation_id, payload FROM events";

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn append(&self, envelope: &EventEnvelope) -> Result<Appended, EventStoreError> {
        self.breaker
            .call(|| self.insert(envelope))
            .await
            .map_err(map_breaker_error)
    }

    async fn find_by_event_id(&self, id: Uuid) -> Result<Option<EventEnvelope>, EventStoreError> {
        let row = sqlx::query(&format!("{SELECT_ENVELOPE} WHERE event_id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;

        row.as_ref().map(row_to_envelope).transpose()
    }

    async fn find(&self, filter: &EventFilter) -> Result<Vec<EventEnvelope>, EventStoreError> {
        let mut builder: QueryBuilder<'_, sqlx::Postgres> = QueryBuilder::new(SELECT_ENVELOPE);
        builder.push(" WHERE 1 = 1");
        if let Some(event_type) = &filter.event_type {
            builder.push(" AND event_type = ").push_bind(event_type);
        }
        if let Some(order_id) = &filter.order_id {
            builder.push(" AND order_id = ").push_bind(order_id);
        }
        if let Some(from) = filter.from {
            builder.push(" AND occurred_at >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            builder.push(" AND occurred_at <= ").push_bind(to);
        }
        builder.push(" ORDER BY occurred_at ASC, event_id ASC");

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;

        rows.iter().map(row_to_envelope).collect()
    }
}
