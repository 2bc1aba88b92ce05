//! Schema registry: validation at both produce and consume sites.
//!
//! The registry maps each `(type, version)` pair to exactly one payload
//! schema and validates envelopes in both directions:
//!
//! - [`SchemaRegistry::validate_incoming`] parses raw bytes from the bus
//!   and validates envelope structure plus payload bounds.
//! - [`SchemaRegistry::validate_outgoing`] checks an envelope a producer
//!   is about to publish.
//!
//! Validating on both sides keeps malformed events out of the broker and
//! out of handlers that would otherwise dereference missing fields.
//!
//! # Error disposition
//!
//! Schema failures are never retried. On the consume side they route
//! straight to the dead-letter queue; on the produce side the caller is
//! told and must not publish. The one exception is
//! [`SchemaError::Malformed`]: bytes that are not JSON at all are treated
//! as a transport glitch and retried under the normal retry budget.
//!
//! # Versioning
//!
//! Evolving a schema adds a new `(type, version + 1)` entry and a new
//! versioned topic; old entries remain so consumers can keep accepting
//! the versions they declare.

use crate::envelope::EventEnvelope;
use crate::payload::{
    EventPayload, InventoryReserveApproved, InventoryReserveRejected, NotificationSent,
    OrdersCancelled, OrdersCreated,
};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Validation failure raised by the schema registry.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// The raw bytes are not parseable JSON. Treated as transient by the
    /// consumer runtime (the retry budget bounds persistent garbage).
    #[error("malformed message: {0}")]
    Malformed(String),

    /// The envelope structure is invalid (missing or ill-typed field).
    #[error("invalid envelope: field '{field}': {reason}")]
    Envelope {
        /// The envelope field that failed.
        field: &'static str,
        /// Why it failed.
        reason: String,
    },

    /// The payload failed its schema's bounds check.
    #[error("invalid payload for '{event_type}': field '{field}': {reason}")]
    Payload {
        /// The event type whose schema rejected the payload.
        event_type: String,
        /// Path of the offending field, e.g. `items[0].quantity`.
        field: String,
        /// Why it failed.
        reason: String,
    },

    /// No schema is registered for this `(type, version)` pair.
    #[error("no schema registered for '{event_type}' v{version}")]
    UnknownSchema {
        /// The unrecognized event type.
        event_type: String,
        /// The unrecognized version.
        version: u32,
    },
}

impl SchemaError {
    pub(crate) fn payload(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Payload {
            event_type: String::new(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether the consumer runtime may retry a delivery that failed with
    /// this error. Only raw parse failures qualify; every other schema
    /// failure is terminal and belongs on the DLQ.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }

    fn with_event_type(self, event_type: &str) -> Self {
        match self {
            Self::Payload { field, reason, .. } => Self::Payload {
                event_type: event_type.to_string(),
                field,
                reason,
            },
            other => other,
        }
    }
}

/// The platform's schema registry.
///
/// Stateless: the v1 catalogue is compiled in. Both validation directions
/// run the same two phases — envelope structure first, then the payload
/// schema selected by `(type, version)`.
pub struct SchemaRegistry;

impl SchemaRegistry {
    /// Every `(type, version)` pair the registry knows.
    pub const KNOWN_SCHEMAS: &'static [(&'static str, u32)] = &[
        (OrdersCreated::EVENT_TYPE, OrdersCreated::VERSION),
        (OrdersCancelled::EVENT_TYPE, OrdersCancelled::VERSION),
        (
            InventoryReserveApproved::EVENT_TYPE,
            InventoryReserveApproved::VERSION,
        ),
        (
            InventoryReserveRejected::EVENT_TYPE,
            InventoryReserveRejected::VERSION,
        ),
        (NotificationSent::EVENT_TYPE, NotificationSent::VERSION),
    ];

    /// Whether a schema is registered for `(event_type, version)`.
    #[must_use]
    pub fn has_schema(event_type: &str, version: u32) -> bool {
        Self::KNOWN_SCHEMAS
            .iter()
            .any(|(t, v)| *t == event_type && *v == version)
    }

    /// Parse and validate raw bytes received from the bus.
    ///
    /// # Errors
    ///
    /// - [`SchemaError::Malformed`] when the bytes are not JSON (transient)
    /// - [`SchemaError::Envelope`] when the envelope structure is invalid
    /// - [`SchemaError::UnknownSchema`] / [`SchemaError::Payload`] when the
    ///   payload fails schema selection or bounds
    pub fn validate_incoming(raw: &[u8]) -> Result<EventEnvelope, SchemaError> {
        let value: serde_json::Value =
            serde_json::from_slice(raw).map_err(|e| SchemaError::Malformed(e.to_string()))?;
        let envelope = Self::parse_envelope(value)?;
        Self::validate_outgoing(&envelope)?;
        Ok(envelope)
    }

    /// Validate an envelope a producer is about to publish.
    ///
    /// # Errors
    ///
    /// Same as [`Self::validate_incoming`] minus [`SchemaError::Malformed`];
    /// a failing envelope must not be published or appended.
    pub fn validate_outgoing(envelope: &EventEnvelope) -> Result<(), SchemaError> {
        Self::validate_structure(envelope)?;
        Self::validate_payload(envelope)
    }

    fn parse_envelope(value: serde_json::Value) -> Result<EventEnvelope, SchemaError> {
        // Check required fields individually before the typed parse so the
        // error names the field instead of a serde position.
        const REQUIRED: &[&str] = &[
            "eventId",
            "type",
            "version",
            "occurredAt",
            "producer",
            "correlationId",
            "payload",
        ];
        let object = value.as_object().ok_or(SchemaError::Envelope {
            field: "envelope",
            reason: "must be a JSON object".to_string(),
        })?;
        for field in REQUIRED {
            if !object.contains_key(*field) {
                return Err(SchemaError::Envelope {
                    field: *field,
                    reason: "required field is missing".to_string(),
                });
            }
        }
        serde_json::from_value(value).map_err(|e| SchemaError::Envelope {
            field: "envelope",
            reason: e.to_string(),
        })
    }

    fn validate_structure(envelope: &EventEnvelope) -> Result<(), SchemaError> {
        if envelope.event_type.trim().is_empty() {
            return Err(SchemaError::Envelope {
                field: "type",
                reason: "must be a non-empty string".to_string(),
            });
        }
        if envelope.version == 0 {
            return Err(SchemaError::Envelope {
                field: "version",
                reason: "must be a positive integer".to_string(),
            });
        }
        if envelope.producer.trim().is_empty() {
            return Err(SchemaError::Envelope {
                field: "producer",
                reason: "must be a non-empty string".to_string(),
            });
        }
        if envelope.correlation_id.trim().is_empty() {
            return Err(SchemaError::Envelope {
                field: "correlationId",
                reason: "must be a non-empty string".to_string(),
            });
        }
        Ok(())
    }

    fn validate_payload(envelope: &EventEnvelope) -> Result<(), SchemaError> {
        match (envelope.event_type.as_str(), envelope.version) {
            ("orders.created", 1) => Self::check::<OrdersCreated>(envelope),
            ("orders.cancelled", 1) => Self::check::<OrdersCancelled>(envelope),
            ("inventory.reserve.approved", 1) => Self::check::<InventoryReserveApproved>(envelope),
            ("inventory.reserve.rejected", 1) => Self::check::<InventoryReserveRejected>(envelope),
            ("notification.sent", 1) => Self::check::<NotificationSent>(envelope),
            (event_type, version) => Err(SchemaError::UnknownSchema {
                event_type: event_type.to_string(),
                version,
            }),
        }
    }

    fn check<P>(envelope: &EventEnvelope) -> Result<(), SchemaError>
    where
        P: EventPayload + DeserializeOwned,
    {
        let payload: P = serde_json::from_value(envelope.payload.clone()).map_err(|e| {
            SchemaError::Payload {
                event_type: envelope.event_type.clone(),
                field: "payload".to_string(),
                reason: e.to_string(),
            }
        })?;
        payload
            .validate()
            .map_err(|e| e.with_event_type(&envelope.event_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{OrderItem, OrdersCreated};
    use serde_json::json;

    fn valid_envelope() -> EventEnvelope {
        OrdersCreated {
            order_id: "ord_1".to_string(),
            customer_id: "cust_1".to_string(),
            items: vec![OrderItem {
                product_id: "p1".to_string(),
                quantity: 2,
                unit_price: 100.0,
            }],
            total: 200.0,
        }
        .envelope("order-service", "corr-1")
        .expect("payload is valid")
    }

    #[test]
    fn every_known_schema_validates_a_well_formed_sample() {
        // Schema totality: every type in the routing table has a validator.
        for (event_type, version) in SchemaRegistry::KNOWN_SCHEMAS {
            assert!(SchemaRegistry::has_schema(event_type, *version));
        }
    }

    #[test]
    fn incoming_roundtrip_preserves_envelope() {
        let envelope = valid_envelope();
        let bytes = envelope.to_bytes().expect("serializes");
        let parsed = SchemaRegistry::validate_incoming(&bytes).expect("validates");
        assert_eq!(parsed, envelope);
    }

    #[test]
    fn non_json_bytes_are_transient() {
        let err = SchemaRegistry::validate_incoming(b"not json at all").unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn missing_envelope_field_is_terminal() {
        let raw = serde_json::to_vec(&json!({
            "type": "orders.created",
            "version": 1,
            "payload": {"orderId": "x"}
        }))
        .expect("serializes");
        let err = SchemaRegistry::validate_incoming(&raw).unwrap_err();
        assert!(!err.is_transient());
        assert!(matches!(err, SchemaError::Envelope { .. }));
    }

    #[test]
    fn incomplete_payload_is_terminal() {
        let mut envelope = valid_envelope();
        envelope.payload = json!({"orderId": "x"});
        let bytes = envelope.to_bytes().expect("serializes");
        let err = SchemaRegistry::validate_incoming(&bytes).unwrap_err();
        assert!(matches!(err, SchemaError::Payload { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn unknown_type_version_is_rejected() {
        let mut envelope = valid_envelope();
        envelope.version = 2;
        let err = SchemaRegistry::validate_outgoing(&envelope).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownSchema { version: 2, .. }));
    }

    #[test]
    fn payload_bound_violation_names_the_field() {
        let mut envelope = valid_envelope();
        envelope.payload["items"][0]["quantity"] = json!(0);
        let err = SchemaRegistry::validate_outgoing(&envelope).unwrap_err();
        assert!(err.to_string().contains("items[0].quantity"), "{err}");
    }
}
