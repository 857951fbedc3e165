//! Route definitions

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::{
    handlers,
    middleware::{FaultInjectionLayer, RequestTrackingLayer},
    state::{InventoryState, OrderState},
};

/// Create the inventory service router
///
/// Fault injection sits inside request tracking, so sabotaged and delayed
/// requests are still counted and carry a request span.
pub fn create_inventory_router(state: InventoryState) -> Router {
    let faults = FaultInjectionLayer::new(Arc::clone(&state.injector), Arc::clone(&state.metrics));
    let tracking = RequestTrackingLayer::new(Arc::clone(&state.metrics));

    Router::new()
        .route("/", get(handlers::health::inventory_root))
        .route("/health", get(handlers::health::inventory_health))
        .route("/metrics", get(handlers::metrics::inventory_metrics))
        .route("/api/inventory", get(handlers::inventory::list_products))
        .route("/api/inventory/update", post(handlers::inventory::update_stock))
        .route(
            "/api/inventory/{product_key}",
            get(handlers::inventory::get_product),
        )
        .route("/api/gremlin/stats", get(handlers::gremlin::latency_stats))
        .route("/api/gremlin/reset", post(handlers::gremlin::reset_latency))
        .route("/api/gremlin/crash-stats", get(handlers::gremlin::crash_stats))
        .route("/api/gremlin/crash-reset", post(handlers::gremlin::reset_crash))
        .layer(faults)
        .layer(tracking)
        .with_state(state)
}

/// Create the order service router
pub fn create_order_router(state: OrderState) -> Router {
    let tracking = RequestTrackingLayer::new(Arc::clone(&state.metrics));

    Router::new()
        .route("/", get(handlers::health::order_root))
        .route("/health", get(handlers::health::order_health))
        .route("/metrics", get(handlers::metrics::order_metrics))
        .route(
            "/api/orders",
            post(handlers::orders::create_order).get(handlers::orders::list_orders),
        )
        .route("/api/orders/{id}", get(handlers::orders::get_order))
        .route(
            "/api/resilience/stats",
            get(handlers::resilience::resilience_stats),
        )
        .layer(tracking)
        .with_state(state)
}
