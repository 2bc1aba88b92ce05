//! Typed, versioned event payloads.
//!
//! One struct per `(type, version)` pair in the v1 catalogue. Each payload
//! knows its event type string and validates its own field bounds; the
//! [`crate::registry::SchemaRegistry`] dispatches to these validators on
//! both the produce and the consume side.
//!
//! Numeric bounds follow the platform contract: quantities are positive
//! integers, prices and totals are positive reals, and every string field
//! is non-empty.

use crate::envelope::EventEnvelope;
use crate::registry::SchemaError;
use serde::{Deserialize, Serialize};

/// A payload that can be validated and wrapped into an [`EventEnvelope`].
///
/// Implementations provide the `(type, version)` pair the payload is
/// registered under and a bounds check over their own fields.
pub trait EventPayload: Serialize {
    /// The dotted event type string, e.g. `orders.created`.
    const EVENT_TYPE: &'static str;
    /// The schema version of this payload shape.
    const VERSION: u32 = 1;

    /// Check the payload's field bounds.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Payload`] naming the offending field path.
    fn validate(&self) -> Result<(), SchemaError>;

    /// Validate this payload and wrap it into an envelope.
    ///
    /// The envelope gets a fresh `eventId` and `occurredAt`; a payload that
    /// fails its own bounds check never becomes an envelope.
    ///
    /// # Errors
    ///
    /// Returns the validation error, or [`SchemaError::Envelope`] if the
    /// payload cannot be serialized to JSON.
    fn envelope(
        &self,
        producer: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Result<EventEnvelope, SchemaError> {
        self.validate()?;
        let payload = serde_json::to_value(self).map_err(|e| SchemaError::Envelope {
            field: "payload",
            reason: e.to_string(),
        })?;
        Ok(EventEnvelope::new(
            Self::EVENT_TYPE,
            Self::VERSION,
            producer,
            correlation_id,
            payload,
        ))
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), SchemaError> {
    if value.trim().is_empty() {
        return Err(SchemaError::payload(field, "must be a non-empty string"));
    }
    Ok(())
}

/// A single order line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    /// Product being ordered.
    pub product_id: String,
    /// Units ordered. Positive integer.
    pub quantity: i64,
    /// Price per unit. Positive.
    pub unit_price: f64,
}

impl OrderItem {
    fn validate(&self, path: &str) -> Result<(), SchemaError> {
        require_non_empty(&format!("{path}.productId"), &self.product_id)?;
        if self.quantity <= 0 {
            return Err(SchemaError::payload(
                format!("{path}.quantity"),
                "must be a positive integer",
            ));
        }
        if !(self.unit_price.is_finite() && self.unit_price > 0.0) {
            return Err(SchemaError::payload(
                format!("{path}.unitPrice"),
                "must be a positive number",
            ));
        }
        Ok(())
    }
}

/// Payload of `orders.created` v1.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrdersCreated {
    /// The new order's aggregate key.
    pub order_id: String,
    /// Customer placing the order.
    pub customer_id: String,
    /// Order lines, at least one.
    pub items: Vec<OrderItem>,
    /// Order total, `Σ quantity · unitPrice`. Positive.
    pub total: f64,
}

impl EventPayload for OrdersCreated {
    const EVENT_TYPE: &'static str = "orders.created";

    fn validate(&self) -> Result<(), SchemaError> {
        require_non_empty("orderId", &self.order_id)?;
        require_non_empty("customerId", &self.customer_id)?;
        if self.items.is_empty() {
            return Err(SchemaError::payload("items", "must contain at least one item"));
        }
        for (i, item) in self.items.iter().enumerate() {
            item.validate(&format!("items[{i}]"))?;
        }
        if !(self.total.is_finite() && self.total > 0.0) {
            return Err(SchemaError::payload("total", "must be a positive number"));
        }
        Ok(())
    }
}

/// Payload of `orders.cancelled` v1.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrdersCancelled {
    /// The cancelled order.
    pub order_id: String,
    /// Why the order was cancelled.
    pub reason: String,
}

impl EventPayload for OrdersCancelled {
    const EVENT_TYPE: &'static str = "orders.cancelled";

    fn validate(&self) -> Result<(), SchemaError> {
        require_non_empty("orderId", &self.order_id)?;
        require_non_empty("reason", &self.reason)
    }
}

/// Payload of `inventory.reserve.approved` v1.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryReserveApproved {
    /// The order whose reservation was approved.
    pub order_id: String,
    /// Identifier of the stock reservation.
    pub reservation_id: String,
}

impl EventPayload for InventoryReserveApproved {
    const EVENT_TYPE: &'static str = "inventory.reserve.approved";

    fn validate(&self) -> Result<(), SchemaError> {
        require_non_empty("orderId", &self.order_id)?;
        require_non_empty("reservationId", &self.reservation_id)
    }
}

/// Payload of `inventory.reserve.rejected` v1.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryReserveRejected {
    /// The order whose reservation was rejected.
    pub order_id: String,
    /// Why the reservation was rejected, e.g. `insufficient_stock`.
    pub reason: String,
}

impl EventPayload for InventoryReserveRejected {
    const EVENT_TYPE: &'static str = "inventory.reserve.rejected";

    fn validate(&self) -> Result<(), SchemaError> {
        require_non_empty("orderId", &self.order_id)?;
        require_non_empty("reason", &self.reason)
    }
}

/// The kind of notification emitted for an order lifecycle step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// An order was placed.
    OrderCreated,
    /// Inventory approved the reservation.
    OrderConfirmed,
    /// Inventory rejected the reservation.
    OrderRejected,
    /// The customer cancelled the order.
    OrderCancelled,
}

impl NotificationKind {
    /// The wire string for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OrderCreated => "order_created",
            Self::OrderConfirmed => "order_confirmed",
            Self::OrderRejected => "order_rejected",
            Self::OrderCancelled => "order_cancelled",
        }
    }
}

/// Payload of `notification.sent` v1.
///
/// The channel is symbolic — this core does not integrate real delivery
/// channels, so producers set it to `log`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSent {
    /// The order the notification concerns.
    pub order_id: String,
    /// Which lifecycle step is being notified.
    pub kind: NotificationKind,
    /// Symbolic delivery channel.
    pub channel: String,
}

impl EventPayload for NotificationSent {
    const EVENT_TYPE: &'static str = "notification.sent";

    fn validate(&self) -> Result<(), SchemaError> {
        require_non_empty("orderId", &self.order_id)?;
        require_non_empty("channel", &self.channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn created(quantity: i64, unit_price: f64) -> OrdersCreated {
        OrdersCreated {
            order_id: "ord_1".to_string(),
            customer_id: "cust_1".to_string(),
            items: vec![OrderItem {
                product_id: "p1".to_string(),
                quantity,
                unit_price,
            }],
            total: 200.0,
        }
    }

    #[test]
    fn valid_order_created_passes() {
        assert!(created(2, 100.0).validate().is_ok());
    }

    #[test]
    fn zero_quantity_is_rejected_with_field_path() {
        let err = created(0, 100.0).validate().unwrap_err();
        assert!(err.to_string().contains("items[0].quantity"), "{err}");
    }

    #[test]
    fn negative_unit_price_is_rejected() {
        assert!(created(1, -5.0).validate().is_err());
    }

    #[test]
    fn empty_items_are_rejected() {
        let payload = OrdersCreated {
            order_id: "ord_1".to_string(),
            customer_id: "cust_1".to_string(),
            items: vec![],
            total: 1.0,
        };
        let err = payload.validate().unwrap_err();
        assert!(err.to_string().contains("items"));
    }

    #[test]
    fn empty_reason_is_rejected() {
        let payload = OrdersCancelled {
            order_id: "ord_1".to_string(),
            reason: "  ".to_string(),
        };
        assert!(payload.validate().is_err());
    }

    #[test]
    fn notification_kind_wire_strings() {
        assert_eq!(NotificationKind::OrderCreated.as_str(), "order_created");
        assert_eq!(
            serde_json::to_value(NotificationKind::OrderConfirmed).unwrap(),
            serde_json::json!("order_confirmed")
        );
    }

    #[test]
    fn envelope_from_payload_carries_type_and_version() {
        let envelope = created(2, 100.0)
            .envelope("order-service", "corr-1")
            .expect("valid payload should wrap");
        assert_eq!(envelope.event_type, "orders.created");
        assert_eq!(envelope.version, 1);
        assert_eq!(envelope.order_id(), Some("ord_1"));
    }

    #[test]
    fn invalid_payload_never_becomes_an_envelope() {
        let result = created(0, 100.0).envelope("order-service", "corr-1");
        assert!(result.is_err());
    }
}
