//! In-memory order repository double.

use async_trait::async_trait;
use chrono::Utc;
use orderline_core::orders::{NewOrder, OrderRecord, OrderRepository, OrderStatus};
use orderline_core::store::EventStoreError;
use std::collections::HashMap;
use std::sync::Mutex;

/// Order read-model backed by a `HashMap`, with idempotent create and
/// last-write-wins status updates.
#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: Mutex<HashMap<String, OrderRecord>>,
}

impl InMemoryOrderRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current status of an order, if it exists.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn status_of(&self, order_id: &str) -> Option<OrderStatus> {
        self.orders
            .lock()
            .expect("lock poisoned")
            .get(order_id)
            .map(|o| o.status)
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, order: &NewOrder) -> Result<OrderRecord, EventStoreError> {
        let mut orders = self.orders.lock().expect("lock poisoned");
        if let Some(existing) = orders.get(&order.order_id) {
            return Ok(existing.clone());
        }
        let now = Utc::now();
        let record = OrderRecord {
            order_id: order.order_id.clone(),
            customer_id: order.customer_id.clone(),
            items: order.items.clone(),
            total: order.total,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        orders.insert(order.order_id.clone(), record.clone());
        Ok(record)
    }

    async fn update_status(
        &self,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<bool, EventStoreError> {
        let mut orders = self.orders.lock().expect("lock poisoned");
        match orders.get_mut(order_id) {
            Some(order) => {
                order.status = status;
                order.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find(&self, order_id: &str) -> Result<Option<OrderRecord>, EventStoreError> {
        Ok(self
            .orders
            .lock()
            .expect("lock poisoned")
            .get(order_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orderline_core::payload::OrderItem;

    fn new_order(order_id: &str) -> NewOrder {
        NewOrder {
            order_id: order_id.to_string(),
            customer_id: "cust_1".to_string(),
            items: vec![OrderItem {
                product_id: "p1".to_string(),
                quantity: 1,
                unit_price: 10.0,
            }],
            total: 10.0,
        }
    }

    #[tokio::test]
    async fn insert_is_idempotent() {
        let repo = InMemoryOrderRepository::new();
        let first = repo.insert(&new_order("ord_1")).await.unwrap();
        repo.update_status("ord_1", OrderStatus::Confirmed)
            .await
            .unwrap();

        let second = repo.insert(&new_order("ord_1")).await.unwrap();
        assert_eq!(second.status, OrderStatus::Confirmed);
        assert_eq!(first.order_id, second.order_id);
    }

    #[tokio::test]
    async fn unknown_order_update_reports_false() {
        let repo = InMemoryOrderRepository::new();
        assert!(!repo
            .update_status("missing", OrderStatus::Confirmed)
            .await
            .unwrap());
    }
}
