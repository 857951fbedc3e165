//! Order handlers

use std::str::FromStr;

use application::{InventoryReceipt, OrderQuery, PlaceOrder, PlacedOrder};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
};
use domain::{Order, OrderId, OrderStatus};
use infrastructure::IDEMPOTENCY_KEY_HEADER;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    error::ApiError,
    handlers::metrics::OrderOutcome,
    middleware::ValidatedJson,
    state::OrderState,
};

/// Order placement request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, max = 128))]
    pub customer_id: String,
    #[serde(alias = "productId")]
    #[validate(length(min = 1, max = 64))]
    pub product_key: String,
    #[validate(length(min = 1, max = 256))]
    pub product_name: String,
    #[validate(range(min = 1, message = "must be at least 1"))]
    pub quantity: u32,
    #[serde(default, alias = "idempotencyKey")]
    #[validate(length(min = 1, max = 200))]
    pub idempotency_key: Option<String>,
}

/// Order placement response
#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub message: &'static str,
    pub order: Order,
    pub replayed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inventory_update: Option<InventoryReceipt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inventory_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit_open: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome_unknown: Option<bool>,
}

impl CreateOrderResponse {
    fn from_placed(placed: PlacedOrder) -> (OrderOutcome, Self) {
        let (outcome, message) = if placed.replayed {
            (OrderOutcome::Replayed, "Order already placed")
        } else if placed.inventory_error.is_some() {
            (OrderOutcome::Failed, "Order failed at the inventory step")
        } else {
            (OrderOutcome::Shipped, "Order shipped")
        };
        let failure = placed.inventory_error;
        (
            outcome,
            Self {
                message,
                order: placed.order,
                replayed: placed.replayed,
                inventory_update: placed.inventory_update,
                circuit_open: failure.as_ref().map(|f| f.circuit_open),
                outcome_unknown: failure.as_ref().map(|f| f.outcome_unknown),
                inventory_error: failure.map(|f| f.message),
            },
        )
    }
}

/// Single order
#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub order: Order,
}

/// Order listing
#[derive(Debug, Serialize)]
pub struct OrderList {
    pub count: usize,
    pub orders: Vec<Order>,
}

/// Listing filters
#[derive(Debug, Default, Deserialize)]
pub struct ListOrdersParams {
    pub customer_id: Option<String>,
    pub status: Option<String>,
    pub limit: Option<u32>,
}

impl ListOrdersParams {
    fn into_query(self) -> Result<OrderQuery, ApiError> {
        let mut query = OrderQuery::new();
        if let Some(customer_id) = self.customer_id.filter(|c| !c.trim().is_empty()) {
            query = query.with_customer(customer_id);
        }
        if let Some(status) = self.status.filter(|s| !s.trim().is_empty()) {
            query = query.with_status(OrderStatus::from_str(&status).map_err(ApiError::BadRequest)?);
        }
        if let Some(limit) = self.limit {
            query = query.with_limit(limit);
        }
        Ok(query)
    }
}

/// Place an order
///
/// Answers 201 for a new or resumed order, including one whose inventory
/// step failed, and 200 when the key replays an already shipped order.
pub async fn create_order(
    State(state): State<OrderState>,
    headers: HeaderMap,
    ValidatedJson(request): ValidatedJson<CreateOrderRequest>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), ApiError> {
    let idempotency_key = request.idempotency_key.or_else(|| {
        headers
            .get(IDEMPOTENCY_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
    });

    let placed = state
        .orders
        .place_order(PlaceOrder {
            customer_id: request.customer_id,
            product_key: request.product_key,
            product_name: request.product_name,
            quantity: request.quantity,
            idempotency_key,
        })
        .await?;

    let (outcome, response) = CreateOrderResponse::from_placed(placed);
    state.metrics.record_order(outcome);

    let status = if response.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(response)))
}

/// Get one order
pub async fn get_order(
    State(state): State<OrderState>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let id = OrderId::parse(&id).map_err(|_| ApiError::BadRequest(format!("Invalid order id: {id}")))?;
    let order = state.orders.get_order(&id).await?;
    Ok(Json(OrderResponse { order }))
}

/// List orders, newest first
pub async fn list_orders(
    State(state): State<OrderState>,
    Query(params): Query<ListOrdersParams>,
) -> Result<Json<OrderList>, ApiError> {
    let orders = state.orders.list_orders(&params.into_query()?).await?;
    Ok(Json(OrderList {
        count: orders.len(),
        orders,
    }))
}
