//! The publishing half of the messaging substrate.
//!
//! [`EventProducer`] wraps an rdkafka [`FutureProducer`] behind the
//! platform publish contract: persistent JSON messages, required
//! correlation and group headers, broker-acknowledged writes, and an MQ
//! circuit breaker in front of every send.
//!
//! A single producer is shared per service; rdkafka serializes the
//! underlying channel internally, so HTTP handlers and consumer workers
//! publish through the same instance.

use orderline_core::bus::{headers, EventBusError, EventPublisher, MessageHeaders};
use orderline_runtime::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};
use orderline_runtime::retry::{retry_with_predicate, RetryPolicy};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;

/// Broker publisher with the platform publish contract baked in.
pub struct EventProducer {
    producer: FutureProducer,
    client_config: ClientConfig,
    timeout: Duration,
    breaker: CircuitBreaker,
}

impl EventProducer {
    /// Create a builder for configuring the producer.
    #[must_use]
    pub fn builder() -> EventProducerBuilder {
        EventProducerBuilder::default()
    }

    /// Readiness probe: fetch metadata for a known topic.
    ///
    /// Returns `true` only when the broker answers within `timeout` and
    /// the topic exists without error. Used by the `/ready` endpoint.
    pub async fn check_topic(&self, topic: &str, timeout: Duration) -> bool {
        let config = self.client_config.clone();
        let topic = topic.to_string();
        tokio::task::spawn_blocking(move || {
            let Ok(consumer) = config.create::<BaseConsumer>() else {
                return false;
            };
            match consumer.fetch_metadata(Some(&topic), timeout) {
                Ok(metadata) => metadata
                    .topics()
                    .iter()
                    .any(|t| t.name() == topic && t.error().is_none()),
                Err(e) => {
                    tracing::warn!(topic = %topic, error = %e, "broker metadata fetch failed");
                    false
                }
            }
        })
        .await
        .unwrap_or(false)
    }

    async fn send_once(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
        headers: &MessageHeaders,
    ) -> Result<(), EventBusError> {
        let owned_headers = build_headers(headers);
        let attempt = headers.attempt;

        // Local queue backpressure is not a failed write: warn, let the
        // buffer drain, and re-enqueue under a short backoff budget. Any
        // other broker error surfaces immediately.
        let policy = RetryPolicy {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            ..RetryPolicy::default()
        };

        retry_with_predicate(
            &policy,
            || {
                let record_headers = owned_headers.clone();
                async move {
                    let record = FutureRecord::to(topic)
                        .key(key)
                        .payload(payload)
                        .headers(record_headers);

                    match self.producer.send(record, Timeout::After(self.timeout)).await {
                        Ok((partition, offset)) => {
                            tracing::debug!(
                                topic = %topic,
                                partition,
                                offset,
                                attempt,
                                "message published"
                            );
                            metrics::counter!("bus.publish.total", "result" => "success")
                                .increment(1);
                            Ok(())
                        }
                        Err((KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull), _)) => {
                            tracing::warn!(topic = %topic, "producer queue full, re-enqueueing");
                            Err(EventBusError::PublishFailed {
                                topic: topic.to_string(),
                                reason: "local queue full".to_string(),
                            })
                        }
                        Err((e, _)) => {
                            tracing::error!(topic = %topic, error = %e, "publish failed");
                            metrics::counter!("bus.publish.total", "result" => "error")
                                .increment(1);
                            Err(EventBusError::PublishFailed {
                                topic: topic.to_string(),
                                reason: e.to_string(),
                            })
                        }
                    }
                }
            },
            |err| {
                matches!(
                    err,
                    EventBusError::PublishFailed { reason, .. } if reason == "local queue full"
                )
            },
        )
        .await
    }
}

#[async_trait::async_trait]
impl EventPublisher for EventProducer {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
        headers: &MessageHeaders,
    ) -> Result<(), EventBusError> {
        match self
            .breaker
            .call(|| self.send_once(topic, key, payload, headers))
            .await
        {
            Ok(()) => Ok(()),
            Err(CircuitBreakerError::Open) => Err(EventBusError::CircuitOpen),
            Err(CircuitBreakerError::Timeout(d)) => Err(EventBusError::PublishFailed {
                topic: topic.to_string(),
                reason: format!("publish timed out after {d:?}"),
            }),
            Err(CircuitBreakerError::Inner(e)) => Err(e),
        }
    }
}

fn build_headers(headers: &MessageHeaders) -> OwnedHeaders {
    let attempt = headers.attempt.to_string();
    let mut owned = OwnedHeaders::new()
        .insert(Header {
            key: "content-type",
            value: Some("application/json"),
        })
        .insert(Header {
            key: headers::CORRELATION_ID,
            value: Some(headers.correlation_id.as_str()),
        })
        .insert(Header {
            key: headers::GROUP_ID,
            value: Some(headers.group_id.as_str()),
        })
        .insert(Header {
            key: headers::ATTEMPT,
            value: Some(attempt.as_str()),
        });
    if let Some(retry_at) = headers.retry_at {
        owned = owned.insert(Header {
            key: headers::RETRY_AT,
            value: Some(retry_at.to_rfc3339().as_str()),
        });
    }
    if headers.replay {
        owned = owned.insert(Header {
            key: headers::REPLAY,
            value: Some("true"),
        });
    }
    owned
}

/// Builder for [`EventProducer`].
///
/// # Example
///
/// ```no_run
/// use orderline_redpanda::EventProducer;
/// use orderline_runtime::circuit_breaker::CircuitBreakerConfig;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let producer = EventProducer::builder()
///     .brokers("localhost:9092")
///     .acks("all")
///     .breaker(CircuitBreakerConfig::default())
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct EventProducerBuilder {
    brokers: Option<String>,
    acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    breaker: Option<CircuitBreakerConfig>,
}

impl EventProducerBuilder {
    /// Set the broker addresses (comma-separated).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the acknowledgment mode ("0", "1", "all"). Default: "all" —
    /// publishes are durable once acknowledged.
    #[must_use]
    pub fn acks(mut self, acks: impl Into<String>) -> Self {
        self.acks = Some(acks.into());
        self
    }

    /// Set the compression codec. Default: "none".
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Set the per-send broker timeout. Default: 5 seconds.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the MQ circuit breaker configuration.
    #[must_use]
    pub fn breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker = Some(config);
        self
    }

    /// Build the producer.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] when brokers are unset
    /// or the rdkafka producer cannot be created.
    pub fn build(self) -> Result<EventProducer, EventBusError> {
        let brokers = self
            .brokers
            .ok_or_else(|| EventBusError::ConnectionFailed("brokers not configured".to_string()))?;

        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", self.acks.as_deref().unwrap_or("all"))
            .set(
                "compression.type",
                self.compression.as_deref().unwrap_or("none"),
            );

        let producer: FutureProducer = client_config.create().map_err(|e| {
            EventBusError::ConnectionFailed(format!("failed to create producer: {e}"))
        })?;

        tracing::info!(brokers = %brokers, "event producer created");

        Ok(EventProducer {
            producer,
            client_config,
            timeout: self.timeout.unwrap_or(Duration::from_secs(5)),
            breaker: CircuitBreaker::new("mq", self.breaker.unwrap_or_default()),
        })
    }
}
