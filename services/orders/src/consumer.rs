//! Order-side consumers of inventory decisions.
//!
//! One [`StatusHandler`] per queue: approved reservations move the
//! aggregate to CONFIRMED, rejected ones to REJECTED. Updates are
//! last-write-wins with no transition guard; an unknown `orderId` is a
//! logged no-op, but the event is recorded either way.

use async_trait::async_trait;
use orderline_core::consumer::{BoxError, Dispatch, EventHandler};
use orderline_core::orders::{OrderRepository, OrderStatus};
use orderline_core::registry::SchemaRegistry;
use orderline_core::store::EventStore;
use std::sync::Arc;
use tracing::{info, warn};

/// Applies an inventory decision to the order aggregate.
pub struct StatusHandler {
    orders: Arc<dyn OrderRepository>,
    store: Arc<dyn EventStore>,
    expected_type: &'static str,
    target: OrderStatus,
}

impl StatusHandler {
    /// Handler for `inventory.reserve.approved.q`.
    pub fn approved(orders: Arc<dyn OrderRepository>, store: Arc<dyn EventStore>) -> Self {
        Self {
            orders,
            store,
            expected_type: "inventory.reserve.approved",
            target: OrderStatus::Confirmed,
        }
    }

    /// Handler for `inventory.reserve.rejected.q`.
    pub fn rejected(orders: Arc<dyn OrderRepository>, store: Arc<dyn EventStore>) -> Self {
        Self {
            orders,
            store,
            expected_type: "inventory.reserve.rejected",
            target: OrderStatus::Rejected,
        }
    }
}

#[async_trait]
impl EventHandler for StatusHandler {
    fn name(&self) -> &str {
        self.expected_type
    }

    async fn handle(&self, raw: &[u8]) -> Result<Dispatch, BoxError> {
        let envelope = match SchemaRegistry::validate_incoming(raw) {
            Ok(envelope) => envelope,
            Err(e) if e.is_transient() => {
                warn!(error = %e, "unparseable event, scheduling retry");
                return Ok(Dispatch::Retry);
            }
            Err(e) => {
                warn!(error = %e, "schema-invalid event, dead-lettering");
                return Ok(Dispatch::Dlq);
            }
        };
        if envelope.event_type != self.expected_type {
            warn!(
                event_type = %envelope.event_type,
                expected = self.expected_type,
                "unexpected event type, ignoring"
            );
            return Ok(Dispatch::Ack);
        }

        // The event is recorded whether or not the aggregate is known.
        self.store.append(&envelope).await?;

        let Some(order_id) = envelope.order_id().map(ToString::to_string) else {
            warn!(event_type = %envelope.event_type, "event without orderId, dead-lettering");
            return Ok(Dispatch::Dlq);
        };

        let updated = self.orders.update_status(&order_id, self.target).await?;
        if updated {
            info!(
                order_id = %order_id,
                status = self.target.as_str(),
                "order status updated"
            );
        } else {
            warn!(
                order_id = %order_id,
                status = self.target.as_str(),
                "unknown orderId, event recorded without transition"
            );
        }

        Ok(Dispatch::Ack)
    }
}
