//! Inventory consumers.
//!
//! [`ReservationHandler`] drives the reservation decision for every
//! `orders.created` event; [`CancelledHandler`] records cancellations
//! (restock is a no-op in this core).

use async_trait::async_trait;
use orderline_core::bus::{EventPublisher, MessageHeaders};
use orderline_core::consumer::{BoxError, Dispatch, EventHandler};
use orderline_core::payload::{
    EventPayload, InventoryReserveApproved, InventoryReserveRejected, OrdersCreated,
};
use orderline_core::registry::SchemaRegistry;
use orderline_core::store::EventStore;
use orderline_core::topology::topic;
use orderline_core::EventEnvelope;
use std::sync::Arc;
use tracing::{info, warn};

/// Reservations above this many total units are rejected.
///
/// A stand-in for a real stock query; swapping in one must preserve the
/// approve/reject semantics.
const MAX_RESERVABLE_UNITS: i64 = 10;

fn short_id(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &id[..10])
}

/// Validate raw bytes into an envelope, mapping schema failures onto the
/// dispatch contract: transient parse failures retry, everything else is
/// terminal.
fn validate_or_dispatch(queue: &str, raw: &[u8]) -> Result<EventEnvelope, Dispatch> {
    match SchemaRegistry::validate_incoming(raw) {
        Ok(envelope) => Ok(envelope),
        Err(e) if e.is_transient() => {
            warn!(queue, error = %e, "unparseable event, scheduling retry");
            Err(Dispatch::Retry)
        }
        Err(e) => {
            warn!(queue, error = %e, "schema-invalid event, dead-lettering");
            Err(Dispatch::Dlq)
        }
    }
}

/// Decides approve/reject for incoming `orders.created` events.
pub struct ReservationHandler {
    store: Arc<dyn EventStore>,
    publisher: Arc<dyn EventPublisher>,
    producer: String,
}

impl ReservationHandler {
    /// Create the handler.
    pub fn new(
        store: Arc<dyn EventStore>,
        publisher: Arc<dyn EventPublisher>,
        producer: impl Into<String>,
    ) -> Self {
        Self {
            store,
            publisher,
            producer: producer.into(),
        }
    }

    fn decide(&self, created: &OrdersCreated, correlation_id: &str) -> Result<EventEnvelope, BoxError> {
        let total_units: i64 = created.items.iter().map(|item| item.quantity).sum();

        let envelope = if total_units > 0 && total_units <= MAX_RESERVABLE_UNITS {
            info!(
                order_id = %created.order_id,
                total_units,
                "reservation approved"
            );
            InventoryReserveApproved {
                order_id: created.order_id.clone(),
                reservation_id: short_id("res"),
            }
            .envelope(&self.producer, correlation_id)?
        } else {
            info!(
                order_id = %created.order_id,
                total_units,
                "reservation rejected"
            );
            InventoryReserveRejected {
                order_id: created.order_id.clone(),
                reason: "insufficient_stock".to_string(),
            }
            .envelope(&self.producer, correlation_id)?
        };
        Ok(envelope)
    }
}

#[async_trait]
impl EventHandler for ReservationHandler {
    fn name(&self) -> &str {
        "inventory-reservation"
    }

    async fn handle(&self, raw: &[u8]) -> Result<Dispatch, BoxError> {
        let envelope = match validate_or_dispatch("order.created.q", raw) {
            Ok(envelope) => envelope,
            Err(dispatch) => return Ok(dispatch),
        };
        if envelope.event_type != OrdersCreated::EVENT_TYPE {
            warn!(event_type = %envelope.event_type, "unexpected event type on order.created.q, ignoring");
            return Ok(Dispatch::Ack);
        }

        self.store.append(&envelope).await?;

        let created: OrdersCreated = serde_json::from_value(envelope.payload.clone())?;
        let decision = self.decide(&created, &envelope.correlation_id)?;
        SchemaRegistry::validate_outgoing(&decision)?;

        self.store.append(&decision).await?;

        let decision_topic = if decision.event_type == InventoryReserveApproved::EVENT_TYPE {
            topic::INVENTORY_RESERVE_APPROVED
        } else {
            topic::INVENTORY_RESERVE_REJECTED
        };
        let headers = MessageHeaders::new(&decision.correlation_id, &created.order_id);
        self.publisher
            .publish(
                decision_topic,
                &created.order_id,
                &decision.to_bytes()?,
                &headers,
            )
            .await?;

        Ok(Dispatch::Ack)
    }
}

/// Records `orders.cancelled` events. Restock is a no-op in this core.
pub struct CancelledHandler {
    store: Arc<dyn EventStore>,
}

impl CancelledHandler {
    /// Create the handler.
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventHandler for CancelledHandler {
    fn name(&self) -> &str {
        "inventory-cancelled"
    }

    async fn handle(&self, raw: &[u8]) -> Result<Dispatch, BoxError> {
        let envelope = match validate_or_dispatch("orders.cancelled.q", raw) {
            Ok(envelope) => envelope,
            Err(dispatch) => return Ok(dispatch),
        };

        self.store.append(&envelope).await?;
        Ok(Dispatch::Ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orderline_core::payload::OrderItem;
    use orderline_testing::{InMemoryEventStore, RecordingPublisher};

    fn created_envelope(quantities: &[i64]) -> EventEnvelope {
        OrdersCreated {
            order_id: "ord_1".to_string(),
            customer_id: "cust_1".to_string(),
            items: quantities
                .iter()
                .map(|&quantity| OrderItem {
                    product_id: "p1".to_string(),
                    quantity,
                    unit_price: 100.0,
                })
                .collect(),
            total: 100.0,
        }
        .envelope("order-service", "corr-1")
        .expect("payload is valid")
    }

    fn handler() -> (ReservationHandler, Arc<InMemoryEventStore>, Arc<RecordingPublisher>) {
        let store = Arc::new(InMemoryEventStore::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let handler =
            ReservationHandler::new(store.clone(), publisher.clone(), "inventory-service");
        (handler, store, publisher)
    }

    #[tokio::test]
    async fn small_order_is_approved() {
        let (handler, store, publisher) = handler();
        let raw = created_envelope(&[2]).to_bytes().unwrap();

        let dispatch = handler.handle(&raw).await.unwrap();
        assert_eq!(dispatch, Dispatch::Ack);

        // Incoming event and the decision are both recorded.
        assert_eq!(store.len(), 2);

        let published = publisher.published_to(topic::INVENTORY_RESERVE_APPROVED);
        assert_eq!(published.len(), 1);
        let decision = published[0].envelope();
        assert_eq!(decision.event_type, "inventory.reserve.approved");
        assert_eq!(decision.correlation_id, "corr-1");
        assert_eq!(published[0].headers.group_id, "ord_1");
    }

    #[tokio::test]
    async fn boundary_of_ten_units_is_still_approved() {
        let (handler, _store, publisher) = handler();
        let raw = created_envelope(&[4, 6]).to_bytes().unwrap();

        handler.handle(&raw).await.unwrap();
        assert_eq!(publisher.published_to(topic::INVENTORY_RESERVE_APPROVED).len(), 1);
        assert!(publisher.published_to(topic::INVENTORY_RESERVE_REJECTED).is_empty());
    }

    #[tokio::test]
    async fn eleven_units_are_rejected_for_insufficient_stock() {
        let (handler, _store, publisher) = handler();
        let raw = created_envelope(&[11]).to_bytes().unwrap();

        handler.handle(&raw).await.unwrap();

        let published = publisher.published_to(topic::INVENTORY_RESERVE_REJECTED);
        assert_eq!(published.len(), 1);
        let decision = published[0].envelope();
        assert_eq!(decision.payload["reason"], "insufficient_stock");
    }

    #[tokio::test]
    async fn schema_invalid_event_goes_to_dlq_without_side_effects() {
        let (handler, store, publisher) = handler();
        // Missing required payload fields.
        let raw = serde_json::to_vec(&serde_json::json!({
            "eventId": uuid::Uuid::new_v4(),
            "type": "orders.created",
            "version": 1,
            "occurredAt": "2025-06-01T12:00:00Z",
            "producer": "order-service",
            "correlationId": "corr-1",
            "payload": {"orderId": "x"}
        }))
        .unwrap();

        let dispatch = handler.handle(&raw).await.unwrap();
        assert_eq!(dispatch, Dispatch::Dlq);
        assert!(store.is_empty(), "nothing may be appended");
        assert!(publisher.published().is_empty(), "nothing may be published");
    }

    #[tokio::test]
    async fn unparseable_bytes_are_retried() {
        let (handler, _store, _publisher) = handler();
        let dispatch = handler.handle(b"not json").await.unwrap();
        assert_eq!(dispatch, Dispatch::Retry);
    }

    #[tokio::test]
    async fn transient_store_failure_bubbles_into_retry() {
        let (handler, store, _publisher) = handler();
        store.set_failing(true);
        let raw = created_envelope(&[2]).to_bytes().unwrap();

        let result = handler.handle(&raw).await;
        assert!(result.is_err(), "handler error is treated as retry");
    }

    #[tokio::test]
    async fn redelivery_deduplicates_the_incoming_append() {
        let (handler, store, publisher) = handler();
        let raw = created_envelope(&[2]).to_bytes().unwrap();

        handler.handle(&raw).await.unwrap();
        handler.handle(&raw).await.unwrap();

        // The incoming envelope is stored once; each delivery produces a
        // decision (downstream transitions are last-write-wins).
        let incoming: Vec<_> = store
            .events()
            .into_iter()
            .filter(|e| e.event_type == "orders.created")
            .collect();
        assert_eq!(incoming.len(), 1);
        assert_eq!(publisher.published().len(), 2);
    }

    #[tokio::test]
    async fn cancelled_events_are_recorded_only() {
        let store = Arc::new(InMemoryEventStore::new());
        let handler = CancelledHandler::new(store.clone());

        let envelope = orderline_core::payload::OrdersCancelled {
            order_id: "ord_1".to_string(),
            reason: "user_request".to_string(),
        }
        .envelope("order-service", "corr-2")
        .unwrap();

        let dispatch = handler.handle(&envelope.to_bytes().unwrap()).await.unwrap();
        assert_eq!(dispatch, Dispatch::Ack);
        assert_eq!(store.len(), 1);
    }
}
