//! Order aggregate read-model over `PostgreSQL`.

use crate::map_breaker_error;
use async_trait::async_trait;
use orderline_core::orders::{NewOrder, OrderRecord, OrderRepository, OrderStatus};
use orderline_core::payload::OrderItem;
use orderline_core::store::EventStoreError;
use orderline_runtime::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

/// `PostgreSQL`-backed order repository.
///
/// Creation is idempotent on `order_id`; status updates are
/// last-write-wins with no transition guard, matching the aggregate
/// contract. Writes run through the DB circuit breaker.
pub struct PostgresOrderRepository {
    pool: PgPool,
    breaker: CircuitBreaker,
}

impl PostgresOrderRepository {
    /// Create a repository over an existing pool.
    #[must_use]
    pub fn from_pool(pool: PgPool, breaker: CircuitBreakerConfig) -> Self {
        Self {
            pool,
            breaker: CircuitBreaker::new("db", breaker),
        }
    }

    async fn insert_once(&self, order: &NewOrder) -> Result<OrderRecord, EventStoreError> {
        let items = serde_json::to_value(&order.items)
            .map_err(|e| EventStoreError::SerializationError(e.to_string()))?;

        sqlx::query(
            r"
            INSERT INTO orders (order_id, customer_id, items, total, status)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (order_id) DO NOTHING
            ",
        )
        .bind(&order.order_id)
        .bind(&order.customer_id)
        .bind(&items)
        .bind(order.total)
        .bind(OrderStatus::Pending.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;

        // Duplicate orderId returns the existing row unchanged.
        let row = sqlx::query(SELECT_ORDER_BY_ID)
            .bind(&order.order_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;

        row_to_order(&row)
    }

    async fn update_once(
        &self,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<bool, EventStoreError> {
        let result = sqlx::query(
            "UPDATE orders SET status = $2, updated_at = now() WHERE order_id = $1",
        )
        .bind(order_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}

const SELECT_ORDER_BY_ID: &str = "SELECT order_id, customer_id, items, total, status, \
                                  created_at, updated_at FROM orders WHERE order_id = $1";

fn row_to_order(row: &PgRow) -> Result<OrderRecord, EventStoreError> {
    let items: serde_json::Value = row.get("items");
    let items: Vec<OrderItem> = serde_json::from_value(items)
        .map_err(|e| EventStoreError::SerializationError(e.to_string()))?;
    let status: String = row.get("status");

    Ok(OrderRecord {
        order_id: row.get("order_id"),
        customer_id: row.get("customer_id"),
        items,
        total: row.get("total"),
        status: OrderStatus::parse(&status)?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    async fn insert(&self, order: &NewOrder) -> Result<OrderRecord, EventStoreError> {
        self.breaker
            .call(|| self.insert_once(order))
            .await
            .map_err(map_breaker_error)
    }

    async fn update_status(
        &self,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<bool, EventStoreError> {
        self.breaker
            .call(|| self.update_once(order_id, status))
            .await
            .map_err(map_breaker_error)
    }

    async fn find(&self, order_id: &str) -> Result<Option<OrderRecord>, EventStoreError> {
        let row = sqlx::query(SELECT_ORDER_BY_ID)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;

        row.as_ref().map(row_to_order).transpose()
    }
}
