//! Event bus abstraction: the publish seam between services and the broker.
//!
//! Services publish through the [`EventPublisher`] trait; the concrete
//! Redpanda/Kafka implementation lives in `orderline-redpanda`, and the
//! testing crate provides a recording double. Keeping the trait here lets
//! every service and the consumer runtime stay broker-agnostic.
//!
//! # Publish contract
//!
//! - Messages are persistent JSON (`content-type: application/json`).
//! - Every publish carries `x-correlation-id` (mirroring the envelope) and
//!   `x-group-id` (the aggregate key, used as the partitioning key).
//! - `publish` returns only after the broker has accepted the write.
//! - Publishes run through the MQ circuit breaker; an open breaker
//!   surfaces as [`EventBusError::CircuitOpen`], which callers treat as
//!   transient.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Names of the transport headers attached to every message.
pub mod headers {
    /// Mirrors the envelope's correlation id.
    pub const CORRELATION_ID: &str = "x-correlation-id";
    /// The aggregate key, typically the `orderId`. Also the message key.
    pub const GROUP_ID: &str = "x-group-id";
    /// Delivery attempt counter; absent means 0.
    pub const ATTEMPT: &str = "x-attempt";
    /// RFC3339 deadline before which a retried delivery must not dispatch.
    pub const RETRY_AT: &str = "x-retry-at";
    /// Marks messages re-emitted by the replay tool.
    pub const REPLAY: &str = "x-replay";
}

/// Transport headers carried alongside an envelope.
///
/// `correlation_id` and `group_id` are required on every publish; the
/// remaining fields serve the retry and replay machinery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageHeaders {
    /// Mirrors the envelope's correlation id.
    pub correlation_id: String,
    /// The aggregate key; used as the message key for partitioning.
    pub group_id: String,
    /// Delivery attempt counter. 0 on first publish.
    pub attempt: u32,
    /// Deadline a retried delivery sits out before dispatch.
    pub retry_at: Option<DateTime<Utc>>,
    /// Whether this message was re-emitted by the replay tool.
    pub replay: bool,
}

impl MessageHeaders {
    /// Headers for a first publish of an event.
    #[must_use]
    pub fn new(correlation_id: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            group_id: group_id.into(),
            attempt: 0,
            retry_at: None,
            replay: false,
        }
    }

    /// Set the delivery attempt counter.
    #[must_use]
    pub const fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    /// Set the redelivery deadline.
    #[must_use]
    pub const fn with_retry_at(mut self, retry_at: DateTime<Utc>) -> Self {
        self.retry_at = Some(retry_at);
        self
    }

    /// Mark the message as a replay emission.
    #[must_use]
    pub const fn for_replay(mut self) -> Self {
        self.replay = true;
        self
    }
}

/// Errors raised by the messaging substrate.
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    /// Could not reach or configure the broker.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// A publish was not accepted by the broker.
    #[error("publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed.
        topic: String,
        /// Broker-reported reason.
        reason: String,
    },

    /// A subscription could not be established.
    #[error("subscription failed for queue '{queue}': {reason}")]
    SubscriptionFailed {
        /// The logical queue that failed to bind.
        queue: String,
        /// Broker-reported reason.
        reason: String,
    },

    /// The MQ circuit breaker is open; the call was not attempted.
    #[error("broker circuit breaker is open")]
    CircuitOpen,

    /// Network or transport failure mid-stream.
    #[error("transport error: {0}")]
    TransportError(String),

    /// Topic administration (bootstrap) failure.
    #[error("admin error: {0}")]
    AdminFailed(String),
}

impl EventBusError {
    /// Whether a caller should treat this failure as transient and retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::CircuitOpen | Self::TransportError(_) | Self::PublishFailed { .. }
        )
    }
}

/// The publish seam of the messaging substrate.
///
/// Implementations must be `Send + Sync`; a single publisher is shared
/// across a service's HTTP handlers and consumer workers.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish one message.
    ///
    /// `key` is the partitioning key (the aggregate id); `payload` is the
    /// serialized envelope. Returns once the broker has accepted the
    /// write.
    ///
    /// # Errors
    ///
    /// [`EventBusError::PublishFailed`] if the broker rejects the write,
    /// [`EventBusError::CircuitOpen`] if the MQ breaker is open.
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
        headers: &MessageHeaders,
    ) -> Result<(), EventBusError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_builder_sets_retry_fields() {
        let at = Utc::now();
        let headers = MessageHeaders::new("corr", "ord_1")
            .with_attempt(2)
            .with_retry_at(at);
        assert_eq!(headers.attempt, 2);
        assert_eq!(headers.retry_at, Some(at));
        assert!(!headers.replay);
    }

    #[test]
    fn circuit_open_is_transient() {
        assert!(EventBusError::CircuitOpen.is_transient());
        assert!(!EventBusError::ConnectionFailed("x".to_string()).is_transient());
    }
}
