//! HTTP surface of the order service.
//!
//! `POST /orders` supports an optional `Idempotency-Key` header: within
//! the TTL window a repeated key returns the originally produced order
//! instead of creating a new one. The shipped idempotency map is
//! **in-process only** — replicas do not share it. Deployments running
//! more than one replica must swap in a shared
//! [`IdempotencyStore`](orderline_web::IdempotencyStore) implementation;
//! the trait is the extension point.

use axum::extract::{FromRef, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use orderline_core::bus::{EventPublisher, MessageHeaders};
use orderline_core::orders::{NewOrder, OrderRecord, OrderRepository, OrderStatus};
use orderline_core::payload::{EventPayload, OrderItem, OrdersCancelled, OrdersCreated};
use orderline_core::registry::SchemaRegistry;
use orderline_core::store::EventStore;
use orderline_core::topology::topic;
use orderline_runtime::readiness::Readiness;
use orderline_web::{AppError, IdempotencyStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Shared state of the HTTP surface.
#[derive(Clone)]
pub struct AppState {
    /// Order aggregate repository.
    pub orders: Arc<dyn OrderRepository>,
    /// Event store of this service.
    pub store: Arc<dyn EventStore>,
    /// Broker publisher.
    pub publisher: Arc<dyn EventPublisher>,
    /// Idempotency-key mapping.
    pub idempotency: Arc<dyn IdempotencyStore>,
    /// Readiness prober backing `/ready`.
    pub readiness: Arc<Readiness>,
    /// Name stamped into produced envelopes.
    pub service_name: String,
    /// Retention of idempotency mappings.
    pub idempotency_ttl: Duration,
}

impl FromRef<AppState> for Arc<Readiness> {
    fn from_ref(state: &AppState) -> Self {
        state.readiness.clone()
    }
}

/// Build the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/:order_id", get(get_order))
        .route("/orders/:order_id/cancel", post(cancel_order))
        .route("/health", get(orderline_web::health::health))
        .route("/ready", get(orderline_web::health::ready))
        .with_state(state)
}

/// `POST /orders` request body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    /// Customer placing the order.
    pub customer_id: String,
    /// Order lines, at least one.
    pub items: Vec<OrderItem>,
}

/// `POST /orders/{id}/cancel` request body.
#[derive(Debug, Default, Deserialize)]
pub struct CancelOrderRequest {
    /// Optional cancellation reason.
    pub reason: Option<String>,
}

/// Order identity and status, the response of the write endpoints.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusResponse {
    /// Aggregate key.
    pub order_id: String,
    /// Current lifecycle status.
    pub status: OrderStatus,
    /// Present and `true` on an idempotent replay.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotent: Option<bool>,
}

fn validate_create(body: &CreateOrderRequest) -> Result<(), AppError> {
    if body.customer_id.trim().is_empty() {
        return Err(AppError::bad_request("customerId must be a non-empty string"));
    }
    if body.items.is_empty() {
        return Err(AppError::bad_request("items must contain at least one item"));
    }
    for (i, item) in body.items.iter().enumerate() {
        if item.product_id.trim().is_empty() {
            return Err(AppError::bad_request(format!(
                "items[{i}].productId must be a non-empty string"
            )));
        }
        if item.quantity <= 0 {
            return Err(AppError::bad_request(format!(
                "items[{i}].quantity must be a positive integer"
            )));
        }
        if !(item.unit_price.is_finite() && item.unit_price > 0.0) {
            return Err(AppError::bad_request(format!(
                "items[{i}].unitPrice must be a positive number"
            )));
        }
    }
    Ok(())
}

fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), ToString::to_string)
}

fn short_id(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &id[..10])
}

#[allow(clippy::cast_precision_loss)]
fn order_total(items: &[OrderItem]) -> f64 {
    items
        .iter()
        .map(|item| item.quantity as f64 * item.unit_price)
        .sum()
}

/// `POST /orders`: create an order and publish `orders.created`.
pub async fn create_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderStatusResponse>), AppError> {
    validate_create(&body)?;

    let idempotency_key = headers
        .get("Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);

    // A repeated key within the TTL returns the original order with no
    // further side effects, regardless of the retried body.
    if let Some(key) = &idempotency_key {
        if let Some(order_id) = state.idempotency.get(key).await {
            let status = state
                .orders
                .find(&order_id)
                .await?
                .map_or(OrderStatus::Pending, |order| order.status);
            info!(order_id = %order_id, "idempotent replay of order creation");
            return Ok((
                StatusCode::OK,
                Json(OrderStatusResponse {
                    order_id,
                    status,
                    idempotent: Some(true),
                }),
            ));
        }
    }

    let order_id = short_id("ord");
    let total = order_total(&body.items);
    let record = state
        .orders
        .insert(&NewOrder {
            order_id: order_id.clone(),
            customer_id: body.customer_id.clone(),
            items: body.items.clone(),
            total,
        })
        .await?;

    let correlation_id = correlation_id(&headers);
    // A failing envelope is a 500 and nothing is appended or published.
    let envelope = OrdersCreated {
        order_id: record.order_id.clone(),
        customer_id: body.customer_id,
        items: body.items,
        total,
    }
    .envelope(&state.service_name, &correlation_id)?;
    SchemaRegistry::validate_outgoing(&envelope)?;

    state.store.append(&envelope).await?;

    let bytes = envelope
        .to_bytes()
        .map_err(|e| AppError::internal(format!("failed to serialize envelope: {e}")))?;
    let message_headers = MessageHeaders::new(&correlation_id, &record.order_id);
    state
        .publisher
        .publish(topic::ORDERS_CREATED, &record.order_id, &bytes, &message_headers)
        .await?;

    if let Some(key) = idempotency_key {
        state
            .idempotency
            .put(&key, &record.order_id, state.idempotency_ttl)
            .await;
    }

    info!(
        order_id = %record.order_id,
        total,
        correlation_id = %correlation_id,
        "order created"
    );
    Ok((
        StatusCode::CREATED,
        Json(OrderStatusResponse {
            order_id: record.order_id,
            status: record.status,
            idempotent: None,
        }),
    ))
}

/// `POST /orders/{id}/cancel`: eagerly cancel and publish
/// `orders.cancelled`.
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    headers: HeaderMap,
    body: Option<Json<CancelOrderRequest>>,
) -> Result<(StatusCode, Json<OrderStatusResponse>), AppError> {
    let reason = body
        .and_then(|Json(b)| b.reason)
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| "user_request".to_string());

    let updated = state
        .orders
        .update_status(&order_id, OrderStatus::Cancelled)
        .await?;
    if !updated {
        return Err(AppError::not_found("order", &order_id));
    }

    let correlation_id = correlation_id(&headers);
    let envelope = OrdersCancelled {
        order_id: order_id.clone(),
        reason,
    }
    .envelope(&state.service_name, &correlation_id)?;
    SchemaRegistry::validate_outgoing(&envelope)?;

    state.store.append(&envelope).await?;

    let bytes = envelope
        .to_bytes()
        .map_err(|e| AppError::internal(format!("failed to serialize envelope: {e}")))?;
    let message_headers = MessageHeaders::new(&correlation_id, &order_id);
    state
        .publisher
        .publish(topic::ORDERS_CANCELLED, &order_id, &bytes, &message_headers)
        .await?;

    info!(order_id = %order_id, "order cancelled");
    Ok((
        StatusCode::ACCEPTED,
        Json(OrderStatusResponse {
            order_id,
            status: OrderStatus::Cancelled,
            idempotent: None,
        }),
    ))
}

/// `GET /orders/{id}`: the order aggregate.
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<OrderRecord>, AppError> {
    state
        .orders
        .find(&order_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("order", &order_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use orderline_testing::{InMemoryEventStore, InMemoryOrderRepository, RecordingPublisher};
    use orderline_web::InMemoryIdempotencyStore;

    struct Fixture {
        state: AppState,
        store: Arc<InMemoryEventStore>,
        orders: Arc<InMemoryOrderRepository>,
        publisher: Arc<RecordingPublisher>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryEventStore::new());
        let orders = Arc::new(InMemoryOrderRepository::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let state = AppState {
            orders: orders.clone(),
            store: store.clone(),
            publisher: publisher.clone(),
            idempotency: Arc::new(InMemoryIdempotencyStore::new()),
            readiness: Arc::new(Readiness::new(Duration::from_millis(200))),
            service_name: "order-service".to_string(),
            idempotency_ttl: Duration::from_secs(60),
        };
        Fixture {
            state,
            store,
            orders,
            publisher,
        }
    }

    fn valid_body() -> CreateOrderRequest {
        CreateOrderRequest {
            customer_id: "cust_1".to_string(),
            items: vec![OrderItem {
                product_id: "p1".to_string(),
                quantity: 2,
                unit_price: 100.0,
            }],
        }
    }

    #[tokio::test]
    async fn create_returns_pending_order_and_publishes() {
        let f = fixture();

        let (status, Json(response)) =
            create_order(State(f.state), HeaderMap::new(), Json(valid_body()))
                .await
                .expect("create should succeed");

        assert_eq!(status, StatusCode::CREATED);
        assert!(response.order_id.starts_with("ord_"));
        assert_eq!(response.status, OrderStatus::Pending);
        assert_eq!(response.idempotent, None);

        // One orders.created in the store, with the computed total.
        let events = f.store.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "orders.created");
        assert_eq!(events[0].payload["total"], 200.0);

        // Published with the aggregate key as group id.
        let published = f.publisher.published_to(topic::ORDERS_CREATED);
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].headers.group_id, response.order_id);
        assert_eq!(published[0].key, response.order_id);
    }

    #[tokio::test]
    async fn create_honors_the_correlation_header() {
        let f = fixture();
        let mut headers = HeaderMap::new();
        headers.insert("x-correlation-id", HeaderValue::from_static("corr-abc"));

        create_order(State(f.state), headers, Json(valid_body()))
            .await
            .expect("create should succeed");

        assert_eq!(f.store.events()[0].correlation_id, "corr-abc");
        assert_eq!(f.publisher.published()[0].headers.correlation_id, "corr-abc");
    }

    #[tokio::test]
    async fn repeated_idempotency_key_replays_the_original_order() {
        let f = fixture();
        let mut headers = HeaderMap::new();
        headers.insert("Idempotency-Key", HeaderValue::from_static("idem-123"));

        let (first_status, Json(first)) =
            create_order(State(f.state.clone()), headers.clone(), Json(valid_body()))
                .await
                .expect("first create");
        let (second_status, Json(second)) =
            create_order(State(f.state), headers, Json(valid_body()))
                .await
                .expect("second create");

        assert_eq!(first_status, StatusCode::CREATED);
        assert_eq!(second_status, StatusCode::OK);
        assert_eq!(first.order_id, second.order_id);
        assert_eq!(second.idempotent, Some(true));

        // Exactly one orders.created event and one publish.
        assert_eq!(f.store.len(), 1);
        assert_eq!(f.publisher.published().len(), 1);
    }

    #[tokio::test]
    async fn invalid_bodies_are_rejected_with_400() {
        let f = fixture();

        let empty_customer = CreateOrderRequest {
            customer_id: "  ".to_string(),
            ..valid_body()
        };
        let err = create_order(State(f.state.clone()), HeaderMap::new(), Json(empty_customer))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let no_items = CreateOrderRequest {
            customer_id: "cust_1".to_string(),
            items: vec![],
        };
        let err = create_order(State(f.state.clone()), HeaderMap::new(), Json(no_items))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let mut zero_quantity = valid_body();
        zero_quantity.items[0].quantity = 0;
        let err = create_order(State(f.state.clone()), HeaderMap::new(), Json(zero_quantity))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        // No side effects from rejected requests.
        assert!(f.store.is_empty());
        assert!(f.publisher.published().is_empty());
    }

    #[tokio::test]
    async fn cancel_transitions_eagerly_and_publishes() {
        let f = fixture();
        let (_, Json(created)) =
            create_order(State(f.state.clone()), HeaderMap::new(), Json(valid_body()))
                .await
                .expect("create");

        let (status, Json(response)) = cancel_order(
            State(f.state),
            Path(created.order_id.clone()),
            HeaderMap::new(),
            Some(Json(CancelOrderRequest {
                reason: Some("changed my mind".to_string()),
            })),
        )
        .await
        .expect("cancel");

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(response.status, OrderStatus::Cancelled);
        assert_eq!(f.orders.status_of(&created.order_id), Some(OrderStatus::Cancelled));

        let cancelled = f.publisher.published_to(topic::ORDERS_CANCELLED);
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].envelope().payload["reason"], "changed my mind");
    }

    #[tokio::test]
    async fn cancel_of_unknown_order_is_404() {
        let f = fixture();
        let err = cancel_order(
            State(f.state),
            Path("ord_missing".to_string()),
            HeaderMap::new(),
            None,
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn get_order_round_trips() {
        let f = fixture();
        let (_, Json(created)) =
            create_order(State(f.state.clone()), HeaderMap::new(), Json(valid_body()))
                .await
                .expect("create");

        let Json(found) = get_order(State(f.state.clone()), Path(created.order_id.clone()))
            .await
            .expect("get");
        assert_eq!(found.order_id, created.order_id);

        let err = get_order(State(f.state), Path("ord_missing".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn transient_broker_failure_maps_to_503() {
        let f = fixture();
        f.publisher.set_failing(true);

        let err = create_order(State(f.state), HeaderMap::new(), Json(valid_body()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
