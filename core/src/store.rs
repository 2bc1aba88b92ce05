//! Event store abstraction: append-only persistence of every envelope.
//!
//! Each service keeps its own event store — the durable record of truth —
//! and appends every event it produces or consumes. Appends are
//! deduplicated by `eventId`: under at-least-once delivery a consumer will
//! see the same event more than once, and the unique index makes the
//! second append a no-op the application treats as success.
//!
//! # Implementations
//!
//! - `PostgresEventStore` (`orderline-postgres`): production
//! - `InMemoryEventStore` (`orderline-testing`): unit tests

use crate::envelope::EventEnvelope;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by event store operations.
#[derive(Error, Debug)]
pub enum EventStoreError {
    /// Database connection or query failure.
    #[error("database error: {0}")]
    DatabaseError(String),

    /// An envelope could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// The DB circuit breaker is open; the call was not attempted.
    #[error("database circuit breaker is open")]
    CircuitOpen,
}

impl EventStoreError {
    /// Whether a caller should treat this failure as transient and retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::DatabaseError(_) | Self::CircuitOpen)
    }
}

/// Outcome of an idempotent append.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Appended {
    /// The envelope was written for the first time.
    Inserted,
    /// An envelope with this `eventId` already existed; nothing changed.
    Deduplicated,
}

/// Filter for replay and correlation queries.
///
/// All criteria are optional and conjunctive. Results are always ordered
/// `(occurredAt ASC, eventId ASC)` so a replay is deterministic.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventFilter {
    /// Restrict to one event type, e.g. `orders.created`.
    pub event_type: Option<String>,
    /// Restrict to one aggregate via `payload.orderId`.
    pub order_id: Option<String>,
    /// Events with `occurredAt >= from`.
    pub from: Option<DateTime<Utc>>,
    /// Events with `occurredAt <= to`.
    pub to: Option<DateTime<Utc>>,
}

impl EventFilter {
    /// Whether an envelope matches this filter.
    #[must_use]
    pub fn matches(&self, envelope: &EventEnvelope) -> bool {
        if let Some(event_type) = &self.event_type {
            if &envelope.event_type != event_type {
                return false;
            }
        }
        if let Some(order_id) = &self.order_id {
            if envelope.order_id() != Some(order_id.as_str()) {
                return false;
            }
        }
        if let Some(from) = self.from {
            if envelope.occurred_at < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if envelope.occurred_at > to {
                return false;
            }
        }
        true
    }
}

/// Append-only event persistence keyed by event identity.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append an envelope, deduplicating on `eventId`.
    ///
    /// A duplicate key is the happy path under at-least-once delivery and
    /// is reported as [`Appended::Deduplicated`], not as an error.
    ///
    /// # Errors
    ///
    /// [`EventStoreError::DatabaseError`] on connection or query failure;
    /// [`EventStoreError::CircuitOpen`] when the DB breaker is open.
    async fn append(&self, envelope: &EventEnvelope) -> Result<Appended, EventStoreError>;

    /// Look up a single envelope by its `eventId`.
    ///
    /// # Errors
    ///
    /// [`EventStoreError::DatabaseError`] on connection or query failure.
    async fn find_by_event_id(&self, id: Uuid) -> Result<Option<EventEnvelope>, EventStoreError>;

    /// Query envelopes matching a filter, ordered
    /// `(occurredAt ASC, eventId ASC)`.
    ///
    /// # Errors
    ///
    /// [`EventStoreError::DatabaseError`] on connection or query failure.
    async fn find(&self, filter: &EventFilter) -> Result<Vec<EventEnvelope>, EventStoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(event_type: &str, order_id: &str) -> EventEnvelope {
        EventEnvelope::new(
            event_type,
            1,
            "order-service",
            "corr",
            json!({"orderId": order_id}),
        )
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = EventFilter::default();
        assert!(filter.matches(&envelope("orders.created", "ord_1")));
    }

    #[test]
    fn filter_by_type_and_order() {
        let filter = EventFilter {
            event_type: Some("orders.created".to_string()),
            order_id: Some("ord_1".to_string()),
            ..EventFilter::default()
        };
        assert!(filter.matches(&envelope("orders.created", "ord_1")));
        assert!(!filter.matches(&envelope("orders.created", "ord_2")));
        assert!(!filter.matches(&envelope("orders.cancelled", "ord_1")));
    }

    #[test]
    fn time_window_is_inclusive() {
        let event = envelope("orders.created", "ord_1");
        let filter = EventFilter {
            from: Some(event.occurred_at),
            to: Some(event.occurred_at),
            ..EventFilter::default()
        };
        assert!(filter.matches(&event));
    }
}
