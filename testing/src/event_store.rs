//! In-memory event store double.

use async_trait::async_trait;
use orderline_core::envelope::EventEnvelope;
use orderline_core::store::{Appended, EventFilter, EventStore, EventStoreError};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

/// Event store backed by a `Vec`, with the same `eventId` deduplication
/// and `(occurredAt, eventId)` query ordering as the `PostgreSQL`
/// implementation.
#[derive(Default)]
pub struct InMemoryEventStore {
    events: Mutex<Vec<EventEnvelope>>,
    seen: Mutex<HashSet<Uuid>>,
    failing: AtomicBool,
}

impl InMemoryEventStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored envelope, unordered.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn events(&self) -> Vec<EventEnvelope> {
        self.events.lock().expect("lock poisoned").clone()
    }

    /// Number of stored envelopes.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().expect("lock poisoned").len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make subsequent appends fail with a transient error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, envelope: &EventEnvelope) -> Result<Appended, EventStoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EventStoreError::DatabaseError(
                "injected append failure".to_string(),
            ));
        }
        let mut seen = self.seen.lock().expect("lock poisoned");
        if !seen.insert(envelope.event_id) {
            return Ok(Appended::Deduplicated);
        }
        self.events
            .lock()
            .expect("lock poisoned")
            .push(envelope.clone());
        Ok(Appended::Inserted)
    }

    async fn find_by_event_id(&self, id: Uuid) -> Result<Option<EventEnvelope>, EventStoreError> {
        Ok(self
            .events
            .lock()
            .expect("lock poisoned")
            .iter()
            .find(|e| e.event_id == id)
            .cloned())
    }

    async fn find(&self, filter: &EventFilter) -> Result<Vec<EventEnvelope>, EventStoreError> {
        let mut matching: Vec<EventEnvelope> = self
            .events
            .lock()
            .expect("lock poisoned")
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            a.occurred_at
                .cmp(&b.occurred_at)
                .then(a.event_id.cmp(&b.event_id))
        });
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(order_id: &str) -> EventEnvelope {
        EventEnvelope::new(
            "orders.created",
            1,
            "order-service",
            "corr",
            json!({"orderId": order_id}),
        )
    }

    #[tokio::test]
    async fn append_deduplicates_by_event_id() {
        let store = InMemoryEventStore::new();
        let event = envelope("ord_1");

        assert_eq!(store.append(&event).await.unwrap(), Appended::Inserted);
        assert_eq!(store.append(&event).await.unwrap(), Appended::Deduplicated);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn find_applies_filter_and_order() {
        let store = InMemoryEventStore::new();
        for i in 0..3 {
            store.append(&envelope(&format!("ord_{i}"))).await.unwrap();
        }

        let all = store.find(&EventFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);

        let one = store
            .find(&EventFilter {
                order_id: Some("ord_1".to_string()),
                ..EventFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(one.len(), 1);
    }

    #[tokio::test]
    async fn injected_failure_is_transient() {
        let store = InMemoryEventStore::new();
        store.set_failing(true);
        let err = store.append(&envelope("ord_1")).await.unwrap_err();
        assert!(err.is_transient());
    }
}
