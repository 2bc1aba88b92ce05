//! The canonical event envelope.
//!
//! Every message on the bus is an [`EventEnvelope`]: a fixed-shape JSON
//! wrapper around a type-specific payload. The envelope carries the event's
//! identity (`eventId`, the primary idempotency key), its `(type, version)`
//! schema selector, the producing service, and the correlation id that
//! stitches together all events of one business transaction.
//!
//! # Wire format
//!
//! Envelopes are serialized as JSON with camelCase keys:
//!
//! ```json
//! {
//!   "eventId": "7f9f0c1e-...",
//!   "type": "orders.created",
//!   "version": 1,
//!   "occurredAt": "2025-06-01T12:00:00Z",
//!   "producer": "order-service",
//!   "correlationId": "corr-123",
//!   "payload": { ... }
//! }
//! ```
//!
//! `occurredAt` is assigned once, at envelope construction, and is never
//! rewritten — not even by replay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The fixed-shape wrapper carrying every event.
///
/// All fields are required on the wire. `event_id` is unique across the
/// event store (a second append of the same id is a no-op), and
/// `(event_type, version)` select exactly one payload schema.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EventEnvelope {
    /// Globally unique event identity. Primary idempotency key.
    pub event_id: Uuid,
    /// Dotted event type, e.g. `orders.created`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Schema version, currently `1` for every type.
    pub version: u32,
    /// When the envelope was constructed. Never rewritten by replay.
    pub occurred_at: DateTime<Utc>,
    /// Name of the producing service.
    pub producer: String,
    /// Opaque id threading together all events of one business transaction.
    pub correlation_id: String,
    /// Type-specific payload, validated by the schema registry.
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Construct a new envelope around a payload.
    ///
    /// Mints a fresh `eventId` and stamps `occurredAt` with the current
    /// time. The payload is taken as already-serialized JSON; use
    /// [`crate::payload::EventPayload::envelope`] to build an envelope from
    /// a typed payload with validation.
    #[must_use]
    pub fn new(
        event_type: impl Into<String>,
        version: u32,
        producer: impl Into<String>,
        correlation_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.into(),
            version,
            occurred_at: Utc::now(),
            producer: producer.into(),
            correlation_id: correlation_id.into(),
            payload,
        }
    }

    /// Serialize the envelope to its JSON wire format.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload contains values JSON cannot
    /// represent (non-finite floats).
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// The aggregate key this event belongs to, if the payload carries one.
    ///
    /// Every payload in the v1 catalogue carries an `orderId`; this is the
    /// value published as the `x-group-id` header and message key.
    #[must_use]
    pub fn order_id(&self) -> Option<&str> {
        self.payload.get("orderId").and_then(serde_json::Value::as_str)
    }
}

impl fmt::Display for EventEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} v{} [{}] from {}",
            self.event_type, self.version, self.event_id, self.producer
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_serializes_with_camel_case_keys() {
        let envelope = EventEnvelope::new(
            "orders.created",
            1,
            "order-service",
            "corr-1",
            json!({"orderId": "ord_1"}),
        );

        let value = serde_json::to_value(&envelope).expect("serialization should succeed");
        assert!(value.get("eventId").is_some());
        assert_eq!(value["type"], "orders.created");
        assert!(value.get("occurredAt").is_some());
        assert_eq!(value["correlationId"], "corr-1");
    }

    #[test]
    fn envelope_roundtrip_preserves_identity() {
        let envelope = EventEnvelope::new(
            "orders.cancelled",
            1,
            "order-service",
            "corr-2",
            json!({"orderId": "ord_2", "reason": "user"}),
        );

        let bytes = envelope.to_bytes().expect("serialization should succeed");
        let parsed: EventEnvelope =
            serde_json::from_slice(&bytes).expect("deserialization should succeed");

        assert_eq!(parsed, envelope);
    }

    #[test]
    fn order_id_reads_the_aggregate_key() {
        let envelope = EventEnvelope::new(
            "orders.created",
            1,
            "order-service",
            "corr-3",
            json!({"orderId": "ord_3"}),
        );
        assert_eq!(envelope.order_id(), Some("ord_3"));
    }

    #[test]
    fn missing_field_fails_deserialization() {
        let raw = serde_json::json!({
            "eventId": Uuid::new_v4(),
            "type": "orders.created",
            "version": 1,
            // occurredAt missing
            "producer": "order-service",
            "correlationId": "corr",
            "payload": {}
        });
        let result: Result<EventEnvelope, _> = serde_json::from_value(raw);
        assert!(result.is_err());
    }
}
