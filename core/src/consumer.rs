//! Handler-side contract of the consumer runtime.
//!
//! The runtime (in `orderline-redpanda`) drives one [`EventHandler`] per
//! logical queue. For each delivery it parses the raw bytes as JSON —
//! unparseable bytes take the retry path, since garbage may be a transport
//! glitch and the retry budget bounds the persistent case — and then hands
//! the raw message to the handler, which decides the delivery's fate:
//!
//! ```text
//! received → handled            → Ack      (terminal)
//! received → handler error      → Retry → delayed redelivery → received
//! received → schema invalid     → Dlq      (terminal)
//! received → attempts > budget  → Dlq      (terminal)
//! ```
//!
//! Returning `Err` from a handler is equivalent to `Retry`.

use async_trait::async_trait;

/// Boxed error type handlers may bubble up; treated as a retry.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The fate a handler assigns to a delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// Processing succeeded; acknowledge and move on.
    Ack,
    /// Transient failure; redeliver after the retry delay, dead-letter
    /// once the budget is exhausted.
    Retry,
    /// Terminal failure (schema-invalid input); dead-letter immediately.
    Dlq,
}

/// A per-queue message handler.
///
/// Handlers receive the raw message bytes and typically start by running
/// them through `SchemaRegistry::validate_incoming`, mapping schema
/// failures to [`Dispatch::Dlq`]. They must be idempotent: the platform
/// delivers at least once.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handler name, used in logs and consumer diagnostics.
    fn name(&self) -> &str;

    /// Process one delivery and decide its fate.
    ///
    /// # Errors
    ///
    /// Any error is treated by the runtime as [`Dispatch::Retry`].
    async fn handle(&self, raw: &[u8]) -> Result<Dispatch, BoxError>;
}
