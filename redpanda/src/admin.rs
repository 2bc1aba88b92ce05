//! Topic bootstrap.
//!
//! Services declare the full topology at startup — every primary topic
//! plus each queue's retry and dlq companions — so a fresh broker carries
//! the expected topics before the first publish. Pre-provisioned
//! deployments simply hit the already-exists path.

use orderline_core::bus::EventBusError;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::types::RDKafkaErrorCode;

/// Create the given topics if they do not exist.
///
/// Existing topics are left untouched; only genuinely failed creations
/// are reported.
///
/// # Errors
///
/// Returns [`EventBusError::AdminFailed`] when the admin client cannot be
/// created or a topic creation fails for a reason other than the topic
/// already existing.
pub async fn ensure_topics(brokers: &str, topics: &[String]) -> Result<(), EventBusError> {
    let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .create()
        .map_err(|e| EventBusError::AdminFailed(format!("failed to create admin client: {e}")))?;

    let new_topics: Vec<NewTopic<'_>> = topics
        .iter()
        .map(|name| NewTopic::new(name, 1, TopicReplication::Fixed(1)))
        .collect();

    let results = admin
        .create_topics(new_topics.iter(), &AdminOptions::new())
        .await
        .map_err(|e| EventBusError::AdminFailed(e.to_string()))?;

    for result in results {
        match result {
            Ok(topic) => tracing::info!(topic = %topic, "topic created"),
            Err((topic, RDKafkaErrorCode::TopicAlreadyExists)) => {
                tracing::debug!(topic = %topic, "topic already exists");
            }
            Err((topic, code)) => {
                return Err(EventBusError::AdminFailed(format!(
                    "failed to create topic '{topic}': {code}"
                )));
            }
        }
    }

    Ok(())
}
