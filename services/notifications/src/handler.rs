//! The notification consumer.
//!
//! One [`NotificationHandler`] instance per subscribed queue, each mapping
//! its event type to a [`NotificationKind`]. The "send" is symbolic — the
//! channel is `log` — and happens synchronously with the event append; no
//! delivery latency is simulated.

use async_trait::async_trait;
use orderline_core::bus::{EventPublisher, MessageHeaders};
use orderline_core::consumer::{BoxError, Dispatch, EventHandler};
use orderline_core::payload::{EventPayload, NotificationKind, NotificationSent};
use orderline_core::registry::SchemaRegistry;
use orderline_core::store::EventStore;
use orderline_core::topology::topic;
use std::sync::Arc;
use tracing::{info, warn};

/// The symbolic delivery channel of this core.
const CHANNEL: &str = "log";

/// Emits a `notification.sent` event for each consumed lifecycle event.
pub struct NotificationHandler {
    store: Arc<dyn EventStore>,
    publisher: Arc<dyn EventPublisher>,
    producer: String,
    expected_type: &'static str,
    kind: NotificationKind,
}

impl NotificationHandler {
    /// Create a handler for one queue: `expected_type` is the event type
    /// the queue carries, `kind` the notification it maps to.
    pub fn new(
        store: Arc<dyn EventStore>,
        publisher: Arc<dyn EventPublisher>,
        producer: impl Into<String>,
        expected_type: &'static str,
        kind: NotificationKind,
    ) -> Self {
        Self {
            store,
            publisher,
            producer: producer.into(),
            expected_type,
            kind,
        }
    }
}

#[async_trait]
impl EventHandler for NotificationHandler {
    fn name(&self) -> &str {
        self.kind.as_str()
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

        self.store.append(&envelope).await?;

        let Some(order_id) = envelope.order_id().map(ToString::to_string) else {
            // Validation guarantees an orderId for every v1 payload.
            warn!(event_type = %envelope.event_type, "event without orderId, dead-lettering");
            return Ok(Dispatch::Dlq);
        };

        let notification = NotificationSent {
            order_id: order_id.clone(),
            kind: self.kind,
            channel: CHANNEL.to_string(),
        }
        .envelope(&self.producer, &envelope.correlation_id)?;
        SchemaRegistry::validate_outgoing(&notification)?;

        self.store.append(&notification).await?;

        let headers = MessageHeaders::new(&notification.correlation_id, &order_id);
        self.publisher
            .publish(
                topic::NOTIFICATION_SENT,
                &order_id,
                &notification.to_bytes()?,
                &headers,
            )
            .await?;

        info!(
            order_id = %order_id,
            kind = self.kind.as_str(),
            channel = CHANNEL,
            "notification sent"
        );
        Ok(Dispatch::Ack)
    }
}
