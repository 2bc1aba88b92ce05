//! The order aggregate read-model and its repository seam.
//!
//! Order aggregates are created by the order service's HTTP endpoint and
//! mutated only by that service's own consumers of inventory and
//! cancellation events. Updates are last-write-wins with no transition
//! guards — this matches the platform contract, and replays therefore
//! never roll an aggregate back. `REJECTED` and `CANCELLED` are terminal
//! by convention: later inventory events are still recorded in the event
//! store but the status they would set simply overwrites nothing new.

use crate::payload::OrderItem;
use crate::store::EventStoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of an order aggregate.
///
/// ```text
/// initial → PENDING              (create)
/// PENDING → CONFIRMED            (inventory approved)
/// PENDING → REJECTED             (inventory rejected)
/// PENDING | CONFIRMED → CANCELLED (user cancel)
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// Created, awaiting the inventory decision.
    Pending,
    /// Inventory approved the reservation.
    Confirmed,
    /// Inventory rejected the reservation.
    Rejected,
    /// Cancelled by the customer.
    Cancelled,
}

impl OrderStatus {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Rejected => "REJECTED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Parse the database string representation.
    ///
    /// # Errors
    ///
    /// Returns an error naming the unknown status string.
    pub fn parse(s: &str) -> Result<Self, EventStoreError> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "CONFIRMED" => Ok(Self::Confirmed),
            "REJECTED" => Ok(Self::Rejected),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(EventStoreError::SerializationError(format!(
                "invalid order status: {other}"
            ))),
        }
    }
}

/// A fully persisted order aggregate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    /// Aggregate key.
    pub order_id: String,
    /// Customer who placed the order.
    pub customer_id: String,
    /// Order lines.
    pub items: Vec<OrderItem>,
    /// Order total.
    pub total: f64,
    /// Current lifecycle status.
    pub status: OrderStatus,
    /// When the aggregate was created.
    pub created_at: DateTime<Utc>,
    /// When the aggregate was last mutated.
    pub updated_at: DateTime<Utc>,
}

/// The fields needed to create an order aggregate. Status starts PENDING.
#[derive(Clone, Debug, PartialEq)]
pub struct NewOrder {
    /// Aggregate key, minted by the order service.
    pub order_id: String,
    /// Customer placing the order.
    pub customer_id: String,
    /// Order lines.
    pub items: Vec<OrderItem>,
    /// Pre-computed total.
    pub total: f64,
}

/// Persistence seam for order aggregates.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert a new PENDING order. Idempotent: if `order_id` already
    /// exists the stored record is returned unchanged.
    ///
    /// # Errors
    ///
    /// [`EventStoreError::DatabaseError`] on connection or query failure.
    async fn insert(&self, order: &NewOrder) -> Result<OrderRecord, EventStoreError>;

    /// Set an order's status, last-write-wins. Returns `false` when the
    /// order is unknown — callers log a warning but do not fail the
    /// delivery.
    ///
    /// # Errors
    ///
    /// [`EventStoreError::DatabaseError`] on connection or query failure.
    async fn update_status(
        &self,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<bool, EventStoreError>;

    /// Look up an order by its aggregate key.
    ///
    /// # Errors
    ///
    /// [`EventStoreError::DatabaseError`] on connection or query failure.
    async fn find(&self, order_id: &str) -> Result<Option<OrderRecord>, EventStoreError>;
}
