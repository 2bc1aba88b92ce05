//! Recording publisher double.

use async_trait::async_trait;
use orderline_core::bus::{EventBusError, EventPublisher, MessageHeaders};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// One captured publish.
#[derive(Clone, Debug)]
pub struct PublishedMessage {
    /// Topic the message was published to.
    pub topic: String,
    /// Partitioning key (the aggregate id).
    pub key: String,
    /// Serialized envelope bytes.
    pub payload: Vec<u8>,
    /// Transport headers.
    pub headers: MessageHeaders,
}

impl PublishedMessage {
    /// Deserialize the payload as an envelope.
    ///
    /// # Panics
    ///
    /// Panics if the payload is not a valid envelope; tests publish only
    /// valid envelopes.
    #[must_use]
    pub fn envelope(&self) -> orderline_core::EventEnvelope {
        serde_json::from_slice(&self.payload).expect("published payload should be an envelope")
    }
}

/// Publisher that records instead of talking to a broker.
///
/// Flip [`RecordingPublisher::set_failing`] to make every publish fail
/// with a transient error, for driving handler retry paths.
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<PublishedMessage>>,
    failing: AtomicBool,
}

impl RecordingPublisher {
    /// Create an empty recording publisher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().expect("lock poisoned").clone()
    }

    /// Messages published to one topic, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn published_to(&self, topic: &str) -> Vec<PublishedMessage> {
        self.published
            .lock()
            .expect("lock poisoned")
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Make subsequent publishes fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
        headers: &MessageHeaders,
    ) -> Result<(), EventBusError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EventBusError::TransportError(
                "injected publish failure".to_string(),
            ));
        }
        self.published
            .lock()
            .expect("lock poisoned")
            .push(PublishedMessage {
                topic: topic.to_string(),
                key: key.to_string(),
                payload: payload.to_vec(),
                headers: headers.clone(),
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_publishes_in_order() {
        let publisher = RecordingPublisher::new();
        let headers = MessageHeaders::new("corr", "ord_1");

        publisher
            .publish("topic.a", "ord_1", b"one", &headers)
            .await
            .unwrap();
        publisher
            .publish("topic.b", "ord_1", b"two", &headers)
            .await
            .unwrap();

        let all = publisher.published();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].topic, "topic.a");
        assert_eq!(publisher.published_to("topic.b").len(), 1);
    }

    #[tokio::test]
    async fn failure_injection_raises_transient_errors() {
        let publisher = RecordingPublisher::new();
        publisher.set_failing(true);

        let headers = MessageHeaders::new("corr", "ord_1");
        let result = publisher.publish("topic.a", "ord_1", b"x", &headers).await;
        assert!(matches!(result, Err(EventBusError::TransportError(_))));
        assert!(publisher.published().is_empty());
    }
}
