//! Broker topology: topics, queue bindings and the replay routing table.
//!
//! Every versioned routing key is a primary topic; fan-out to several
//! logical queues is consumer-group fan-out. A logical queue owns two
//! companion topics, `<queue>.retry` and `<queue>.dlq`:
//!
//! ```text
//! orders.created.v1 ──┬── order.created.q               (inventory)
//!                     │     ├── order.created.q.retry
//!                     │     └── order.created.q.dlq
//!                     └── orders.created.notification.q (notifications)
//!                           ├── ...retry
//!                           └── ...dlq
//! ```
//!
//! A retried delivery is republished to the queue's retry topic with an
//! incremented `x-attempt` and an `x-retry-at` deadline; the queue's own
//! consumer reads the retry topic back and sits out the remaining delay
//! before dispatching. Deliveries that exhaust the retry budget, and
//! envelopes that fail schema validation, land on the queue's dlq topic.

/// Primary topics, one per versioned routing key.
pub mod topic {
    /// `orders.created` v1 events.
    pub const ORDERS_CREATED: &str = "orders.created.v1";
    /// `orders.cancelled` v1 events.
    pub const ORDERS_CANCELLED: &str = "orders.cancelled.v1";
    /// `inventory.reserve.approved` v1 events.
    pub const INVENTORY_RESERVE_APPROVED: &str = "inventory.reserve.approved.v1";
    /// `inventory.reserve.rejected` v1 events.
    pub const INVENTORY_RESERVE_REJECTED: &str = "inventory.reserve.rejected.v1";
    /// `notification.sent` v1 events.
    pub const NOTIFICATION_SENT: &str = "notification.sent.v1";
    /// Reserved routing key. Declared in the topology but produced and
    /// consumed by nothing yet.
    pub const INVENTORY_RESERVE_REQUESTED: &str = "inventory.reserve.requested.v1";
}

/// A logical queue: a primary topic consumed under a dedicated group.
///
/// The group id doubles as the queue identity, so replicas of the same
/// service share the queue while distinct services each get their own
/// copy of the stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueBinding {
    /// The queue name, e.g. `order.created.q`.
    pub queue: &'static str,
    /// The primary topic the queue is bound to.
    pub topic: &'static str,
}

impl QueueBinding {
    /// The consumer group this queue is consumed under.
    #[must_use]
    pub const fn group(&self) -> &'static str {
        self.queue
    }

    /// The queue's delayed-redelivery topic.
    #[must_use]
    pub fn retry_topic(&self) -> String {
        format!("{}.retry", self.queue)
    }

    /// The queue's terminal dead-letter topic.
    #[must_use]
    pub fn dlq_topic(&self) -> String {
        format!("{}.dlq", self.queue)
    }
}

/// Queue bindings, one per logical queue in the platform.
pub mod queue {
    use super::{topic, QueueBinding};

    /// Inventory's view of new orders.
    pub const ORDER_CREATED: QueueBinding = QueueBinding {
        queue: "order.created.q",
        topic: topic::ORDERS_CREATED,
    };
    /// Inventory's view of cancellations.
    pub const ORDERS_CANCELLED: QueueBinding = QueueBinding {
        queue: "orders.cancelled.q",
        topic: topic::ORDERS_CANCELLED,
    };
    /// The order service's view of approved reservations.
    pub const INVENTORY_RESERVE_APPROVED: QueueBinding = QueueBinding {
        queue: "inventory.reserve.approved.q",
        topic: topic::INVENTORY_RESERVE_APPROVED,
    };
    /// The order service's view of rejected reservations.
    pub const INVENTORY_RESERVE_REJECTED: QueueBinding = QueueBinding {
        queue: "inventory.reserve.rejected.q",
        topic: topic::INVENTORY_RESERVE_REJECTED,
    };
    /// Notification's view of new orders.
    pub const ORDER_CREATED_NOTIFICATION: QueueBinding = QueueBinding {
        queue: "orders.created.notification.q",
        topic: topic::ORDERS_CREATED,
    };
    /// Notification's view of cancellations.
    pub const ORDERS_CANCELLED_NOTIFICATION: QueueBinding = QueueBinding {
        queue: "orders.cancelled.notification.q",
        topic: topic::ORDERS_CANCELLED,
    };
    /// Notification's view of approved reservations.
    pub const INVENTORY_APPROVED_NOTIFICATION: QueueBinding = QueueBinding {
        queue: "inventory.reserve.approved.notification.q",
        topic: topic::INVENTORY_RESERVE_APPROVED,
    };
    /// Notification's view of rejected reservations.
    pub const INVENTORY_REJECTED_NOTIFICATION: QueueBinding = QueueBinding {
        queue: "inventory.reserve.rejected.notification.q",
        topic: topic::INVENTORY_RESERVE_REJECTED,
    };
    /// Audit queue on sent notifications. Bound, no core consumer.
    pub const NOTIFICATION_SENT: QueueBinding = QueueBinding {
        queue: "notification.sent.q",
        topic: topic::NOTIFICATION_SENT,
    };

    /// Every binding declared above.
    pub const ALL: &[QueueBinding] = &[
        ORDER_CREATED,
        ORDERS_CANCELLED,
        INVENTORY_RESERVE_APPROVED,
        INVENTORY_RESERVE_REJECTED,
        ORDER_CREATED_NOTIFICATION,
        ORDERS_CANCELLED_NOTIFICATION,
        INVENTORY_APPROVED_NOTIFICATION,
        INVENTORY_REJECTED_NOTIFICATION,
        NOTIFICATION_SENT,
    ];
}

/// Map an event type to the primary topic it is (re)published on.
///
/// This is the static routing table the replay tool uses; unknown types
/// return `None` and are skipped by the caller.
#[must_use]
pub fn replay_route(event_type: &str) -> Option<&'static str> {
    match event_type {
        "orders.created" => Some(topic::ORDERS_CREATED),
        "orders.cancelled" => Some(topic::ORDERS_CANCELLED),
        "inventory.reserve.approved" => Some(topic::INVENTORY_RESERVE_APPROVED),
        "inventory.reserve.rejected" => Some(topic::INVENTORY_RESERVE_REJECTED),
        "notification.sent" => Some(topic::NOTIFICATION_SENT),
        _ => None,
    }
}

/// The full set of topics a broker must carry: every primary topic plus
/// each queue's retry and dlq companions. Fed to topic bootstrap at
/// service startup.
#[must_use]
pub fn all_topics() -> Vec<String> {
    let mut topics: Vec<String> = vec![
        topic::ORDERS_CREATED.to_string(),
        topic::ORDERS_CANCELLED.to_string(),
        topic::INVENTORY_RESERVE_APPROVED.to_string(),
        topic::INVENTORY_RESERVE_REJECTED.to_string(),
        topic::NOTIFICATION_SENT.to_string(),
        topic::INVENTORY_RESERVE_REQUESTED.to_string(),
    ];
    for binding in queue::ALL {
        topics.push(binding.retry_topic());
        topics.push(binding.dlq_topic());
    }
    topics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SchemaRegistry;

    #[test]
    fn retry_and_dlq_topics_derive_from_queue_name() {
        assert_eq!(queue::ORDER_CREATED.retry_topic(), "order.created.q.retry");
        assert_eq!(queue::ORDER_CREATED.dlq_topic(), "order.created.q.dlq");
    }

    #[test]
    fn every_replayable_type_has_a_schema() {
        // Schema totality over the routing table.
        for event_type in [
            "orders.created",
            "orders.cancelled",
            "inventory.reserve.approved",
            "inventory.reserve.rejected",
            "notification.sent",
        ] {
            assert!(replay_route(event_type).is_some());
            assert!(SchemaRegistry::has_schema(event_type, 1));
        }
    }

    #[test]
    fn unknown_types_have_no_route() {
        assert_eq!(replay_route("orders.refunded"), None);
    }

    #[test]
    fn all_topics_covers_primaries_and_companions() {
        let topics = all_topics();
        assert!(topics.contains(&"orders.created.v1".to_string()));
        assert!(topics.contains(&"order.created.q.retry".to_string()));
        assert!(topics.contains(&"notification.sent.q.dlq".to_string()));
        // Reserved key is declared even though nothing produces it yet.
        assert!(topics.contains(&"inventory.reserve.requested.v1".to_string()));
    }

    #[test]
    fn group_id_is_the_queue_identity() {
        assert_eq!(queue::ORDER_CREATED.group(), "order.created.q");
    }
}
