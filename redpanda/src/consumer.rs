//! Per-queue consumer runtime.
//!
//! A [`QueueWorker`] drives one [`EventHandler`] over one logical queue:
//! it consumes the queue's primary topic and its retry topic under the
//! queue's consumer group, honors redelivery deadlines, applies the
//! ack/retry/dlq state machine, and commits exactly once per delivery
//! after the terminal action.
//!
//! ```text
//! received → handled            → ack                      (terminal)
//! received → handler error      → Q.retry (x-attempt + 1)  → received
//! received → schema invalid     → Q.dlq                    (terminal)
//! received → attempts > budget  → Q.dlq (x-attempt = n+1)  (terminal)
//! ```
//!
//! Messages are processed one at a time per worker (the prefetch-one
//! discipline), so FIFO holds per partition in the absence of retries.
//! Unparseable bytes take the retry path: garbage may be a transport
//! glitch, and the retry budget bounds the persistent case.

use chrono::{DateTime, Utc};
use orderline_core::bus::{headers, EventPublisher, MessageHeaders};
use orderline_core::consumer::{Dispatch, EventHandler};
use orderline_core::topology::QueueBinding;
use orderline_core::EventBusError;
use orderline_runtime::retry::{reconnect_with_backoff, RetryPolicy};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Headers as _, Message};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Transport headers of one delivery, with defaults applied.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct DeliveryHeaders {
    correlation_id: String,
    group_id: String,
    attempt: u32,
    retry_at: Option<DateTime<Utc>>,
}

impl DeliveryHeaders {
    fn apply(&mut self, key: &str, value: &str) {
        match key {
            headers::CORRELATION_ID => self.correlation_id = value.to_string(),
            headers::GROUP_ID => self.group_id = value.to_string(),
            headers::ATTEMPT => self.attempt = value.parse().unwrap_or(0),
            headers::RETRY_AT => {
                self.retry_at = DateTime::parse_from_rfc3339(value)
                    .ok()
                    .map(|t| t.with_timezone(&Utc));
            }
            _ => {}
        }
    }

    fn from_message(message: &BorrowedMessage<'_>) -> Self {
        let mut parsed = Self::default();
        if let Some(message_headers) = message.headers() {
            for header in message_headers.iter() {
                if let Some(value) = header.value {
                    if let Ok(text) = std::str::from_utf8(value) {
                        parsed.apply(header.key, text);
                    }
                }
            }
        }
        if parsed.group_id.is_empty() {
            if let Some(Ok(key)) = message.key_view::<str>() {
                parsed.group_id = key.to_string();
            }
        }
        parsed
    }
}

/// Terminal action for one delivery, after applying the retry budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Resolution {
    Ack,
    Retry { next_attempt: u32 },
    DeadLetter { attempt: u32 },
}

/// Apply the retry budget to a handler's dispatch decision.
const fn resolve(outcome: Dispatch, attempt: u32, max_retries: u32) -> Resolution {
    match outcome {
        Dispatch::Ack => Resolution::Ack,
        Dispatch::Retry => {
            let next_attempt = attempt + 1;
            if next_attempt > max_retries {
                Resolution::DeadLetter {
                    attempt: next_attempt,
                }
            } else {
                Resolution::Retry { next_attempt }
            }
        }
        Dispatch::Dlq => Resolution::DeadLetter { attempt },
    }
}

/// One logical queue's consumer.
///
/// Built via [`QueueWorker::builder`], connected with
/// [`QueueWorkerBuilder::connect`], then spawned as a background task.
pub struct QueueWorker {
    binding: QueueBinding,
    consumer: StreamConsumer,
    publisher: Arc<dyn EventPublisher>,
    handler: Arc<dyn EventHandler>,
    max_retries: u32,
    retry_delay: Duration,
    shutdown: broadcast::Receiver<()>,
}

impl QueueWorker {
    /// Create a builder for configuring a worker.
    #[must_use]
    pub fn builder() -> QueueWorkerBuilder {
        QueueWorkerBuilder::default()
    }

    /// Spawn the worker as a background task.
    ///
    /// The task runs until a shutdown signal is received.
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(mut self) {
        info!(
            queue = self.binding.queue,
            handler = self.handler.name(),
            "queue worker started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(queue = self.binding.queue, "queue worker received shutdown signal");
                    break;
                }
                received = self.consumer.recv() => match received {
                    Ok(message) => {
                        match self.handle_delivery(&message).await {
                            Ok(()) => {
                                if let Err(e) =
                                    self.consumer.commit_message(&message, CommitMode::Async)
                                {
                                    error!(
                                        queue = self.binding.queue,
                                        error = %e,
                                        "failed to commit offset"
                                    );
                                }
                            }
                            // Interrupted mid-delivery: leave the offset
                            // uncommitted so the message is redelivered.
                            Err(Interrupted) => break,
                        }
                    }
                    Err(e) => {
                        error!(queue = self.binding.queue, error = %e, "receive error, backing off");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }

        info!(queue = self.binding.queue, "queue worker stopped");
    }

    async fn handle_delivery(&self, message: &BorrowedMessage<'_>) -> Result<(), Interrupted> {
        let Some(raw) = message.payload() else {
            warn!(queue = self.binding.queue, "delivery without payload, acknowledging");
            return Ok(());
        };
        let delivery = DeliveryHeaders::from_message(message);

        // A delivery from the retry topic sits out the remainder of its
        // redelivery deadline before dispatch.
        if let Some(retry_at) = delivery.retry_at {
            let now = Utc::now();
            if retry_at > now {
                let wait = (retry_at - now).to_std().unwrap_or_default();
                debug!(
                    queue = self.binding.queue,
                    wait_ms = wait.as_millis(),
                    attempt = delivery.attempt,
                    "holding delivery until its retry deadline"
                );
                let mut shutdown = self.shutdown.resubscribe();
                tokio::select! {
                    _ = shutdown.recv() => return Err(Interrupted),
                    () = tokio::time::sleep(wait) => {}
                }
            }
        }

        let outcome = if serde_json::from_slice::<serde_json::Value>(raw).is_err() {
            warn!(
                queue = self.binding.queue,
                attempt = delivery.attempt,
                "unparseable delivery, scheduling retry"
            );
            Dispatch::Retry
        } else {
            match self.handler.handle(raw).await {
                Ok(dispatch) => dispatch,
                Err(e) => {
                    error!(
                        queue = self.binding.queue,
                        handler = self.handler.name(),
                        error = %e,
                        "handler failed, scheduling retry"
                    );
                    Dispatch::Retry
                }
            }
        };

        match resolve(outcome, delivery.attempt, self.max_retries) {
            Resolution::Ack => {
                metrics::counter!("consumer.dispatch.total", "outcome" => "ack").increment(1);
            }
            Resolution::Retry { next_attempt } => {
                metrics::counter!("consumer.dispatch.total", "outcome" => "retry").increment(1);
                let retry_at = Utc::now()
                    + chrono::Duration::from_std(self.retry_delay)
                        .unwrap_or_else(|_| chrono::Duration::seconds(10));
                let message_headers = MessageHeaders::new(&delivery.correlation_id, &delivery.group_id)
                    .with_attempt(next_attempt)
                    .with_retry_at(retry_at);
                self.publish_or_block(&self.binding.retry_topic(), raw, &delivery, &message_headers)
                    .await;
            }
            Resolution::DeadLetter { attempt } => {
                metrics::counter!("consumer.dispatch.total", "outcome" => "dlq").increment(1);
                warn!(
                    queue = self.binding.queue,
                    attempt,
                    "dead-lettering delivery"
                );
                let message_headers = MessageHeaders::new(&delivery.correlation_id, &delivery.group_id)
                    .with_attempt(attempt);
                self.publish_or_block(&self.binding.dlq_topic(), raw, &delivery, &message_headers)
                    .await;
            }
        }

        Ok(())
    }

    /// Publish the raw payload to a companion topic, retrying with backoff
    /// until the broker accepts it. Dropping the message here would break
    /// at-least-once, so the worker blocks instead; a broker outage stalls
    /// the queue exactly like a primary-topic outage would.
    async fn publish_or_block(
        &self,
        topic: &str,
        raw: &[u8],
        delivery: &DeliveryHeaders,
        message_headers: &MessageHeaders,
    ) {
        let policy = RetryPolicy::reconnect();
        reconnect_with_backoff::<_, _, (), EventBusError>(topic, &policy, || async move {
            self.publisher
                .publish(topic, &delivery.group_id, raw, message_headers)
                .await
        })
        .await;
    }
}

/// Marker error: delivery interrupted by shutdown, offset left uncommitted.
struct Interrupted;

/// Builder for [`QueueWorker`].
#[derive(Default)]
pub struct QueueWorkerBuilder {
    brokers: Option<String>,
    binding: Option<QueueBinding>,
    publisher: Option<Arc<dyn EventPublisher>>,
    handler: Option<Arc<dyn EventHandler>>,
    max_retries: Option<u32>,
    retry_delay: Option<Duration>,
    shutdown: Option<broadcast::Receiver<()>>,
}

impl QueueWorkerBuilder {
    /// Set the broker addresses (comma-separated).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the logical queue this worker consumes.
    #[must_use]
    pub const fn binding(mut self, binding: QueueBinding) -> Self {
        self.binding = Some(binding);
        self
    }

    /// Set the publisher used for retry and dlq routing.
    #[must_use]
    pub fn publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Set the handler that processes each delivery.
    #[must_use]
    pub fn handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Set the retry budget (default: 3).
    #[must_use]
    pub const fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Set the redelivery delay (default: 10 seconds).
    #[must_use]
    pub const fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Set the shutdown signal receiver.
    #[must_use]
    pub fn shutdown(mut self, shutdown: broadcast::Receiver<()>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Create the consumer, subscribe it to the queue's topics, and
    /// return the worker ready to spawn.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] when the consumer
    /// cannot be created or subscribed.
    ///
    /// # Panics
    ///
    /// Panics if a required builder field is missing.
    pub fn connect(self) -> Result<QueueWorker, EventBusError> {
        let brokers = self.brokers.expect("brokers are required");
        let binding = self.binding.expect("binding is required");

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("group.id", binding.group())
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| EventBusError::SubscriptionFailed {
                queue: binding.queue.to_string(),
                reason: format!("failed to create consumer: {e}"),
            })?;

        let retry_topic = binding.retry_topic();
        consumer
            .subscribe(&[binding.topic, retry_topic.as_str()])
            .map_err(|e| EventBusError::SubscriptionFailed {
                queue: binding.queue.to_string(),
                reason: format!("failed to subscribe: {e}"),
            })?;

        info!(
            queue = binding.queue,
            topic = binding.topic,
            retry_topic = %retry_topic,
            "subscribed"
        );

        Ok(QueueWorker {
            binding,
            consumer,
            publisher: self.publisher.expect("publisher is required"),
            handler: self.handler.expect("handler is required"),
            max_retries: self.max_retries.unwrap_or(3),
            retry_delay: self.retry_delay.unwrap_or(Duration::from_secs(10)),
            shutdown: self.shutdown.expect("shutdown is required"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_is_terminal() {
        assert_eq!(resolve(Dispatch::Ack, 0, 3), Resolution::Ack);
        assert_eq!(resolve(Dispatch::Ack, 3, 3), Resolution::Ack);
    }

    #[test]
    fn retry_increments_the_attempt_header() {
        assert_eq!(
            resolve(Dispatch::Retry, 0, 3),
            Resolution::Retry { next_attempt: 1 }
        );
        assert_eq!(
            resolve(Dispatch::Retry, 2, 3),
            Resolution::Retry { next_attempt: 3 }
        );
    }

    #[test]
    fn exhausted_budget_dead_letters_with_final_attempt() {
        // After maxRetries redeliveries the dlq copy carries attempt = max + 1.
        assert_eq!(
            resolve(Dispatch::Retry, 3, 3),
            Resolution::DeadLetter { attempt: 4 }
        );
    }

    #[test]
    fn explicit_dlq_skips_the_retry_budget() {
        assert_eq!(
            resolve(Dispatch::Dlq, 0, 3),
            Resolution::DeadLetter { attempt: 0 }
        );
    }

    #[test]
    fn a_message_is_seen_budget_plus_one_times() {
        // Original delivery plus maxRetries redeliveries, then dlq.
        let max_retries = 3;
        let mut deliveries = 0;
        let mut attempt = 0;
        loop {
            deliveries += 1;
            match resolve(Dispatch::Retry, attempt, max_retries) {
                Resolution::Retry { next_attempt } => attempt = next_attempt,
                Resolution::DeadLetter { attempt: final_attempt } => {
                    assert_eq!(final_attempt, max_retries + 1);
                    break;
                }
                Resolution::Ack => unreachable!(),
            }
        }
        assert_eq!(deliveries, max_retries + 1);
    }

    #[test]
    fn headers_parse_with_defaults() {
        let mut parsed = DeliveryHeaders::default();
        parsed.apply(headers::CORRELATION_ID, "corr-1");
        parsed.apply(headers::GROUP_ID, "ord_1");
        parsed.apply(headers::ATTEMPT, "2");
        assert_eq!(parsed.correlation_id, "corr-1");
        assert_eq!(parsed.group_id, "ord_1");
        assert_eq!(parsed.attempt, 2);
        assert_eq!(parsed.retry_at, None);
    }

    #[test]
    fn malformed_attempt_header_defaults_to_zero() {
        let mut parsed = DeliveryHeaders::default();
        parsed.apply(headers::ATTEMPT, "not-a-number");
        assert_eq!(parsed.attempt, 0);
    }

    #[test]
    fn retry_at_header_roundtrips_rfc3339() {
        let now = Utc::now();
        let mut parsed = DeliveryHeaders::default();
        parsed.apply(headers::RETRY_AT, &now.to_rfc3339());
        assert_eq!(parsed.retry_at, Some(now));
    }
}
