//! Service descriptor and health check handlers

use axum::{Json, extract::State, http::StatusCode};
use chrono::{DateTime, Utc};
use infrastructure::CircuitState;
use serde::Serialize;

use crate::state::{InventoryState, OrderState};

/// Name reported by the inventory service
pub const INVENTORY_SERVICE: &str = "inventory-service";
/// Name reported by the order service
pub const ORDER_SERVICE: &str = "order-service";

/// Root descriptor
#[derive(Debug, Clone, Serialize)]
pub struct ServiceDescriptor {
    pub service: &'static str,
    pub version: &'static str,
    pub endpoints: Vec<&'static str>,
}

/// Component checks reported by `/health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthChecks {
    pub database: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inventory_circuit: Option<CircuitState>,
}

/// Fault injection switches reported by the inventory service
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ChaosFlags {
    pub latency_enabled: bool,
    pub crash_enabled: bool,
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub service: &'static str,
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub checks: HealthChecks,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<ChaosFlags>,
}

fn health(
    service: &'static str,
    database_up: bool,
    inventory_circuit: Option<CircuitState>,
    config: Option<ChaosFlags>,
) -> (StatusCode, Json<HealthResponse>) {
    let status_code = if database_up {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status_code,
        Json(HealthResponse {
            service,
            status: if database_up { "healthy" } else { "unhealthy" },
            timestamp: Utc::now(),
            checks: HealthChecks {
                database: if database_up { "ok" } else { "unreachable" },
                inventory_circuit,
            },
            config,
        }),
    )
}

/// Inventory service descriptor
pub async fn inventory_root() -> Json<ServiceDescriptor> {
    Json(ServiceDescriptor {
        service: INVENTORY_SERVICE,
        version: env!("CARGO_PKG_VERSION"),
        endpoints: vec![
            "GET /health",
            "GET /metrics",
            "GET /api/inventory",
            "GET /api/inventory/{product_key}",
            "POST /api/inventory/update",
            "GET /api/gremlin/stats",
            "POST /api/gremlin/reset",
            "GET /api/gremlin/crash-stats",
            "POST /api/gremlin/crash-reset",
        ],
    })
}

/// Order service descriptor
pub async fn order_root() -> Json<ServiceDescriptor> {
    Json(ServiceDescriptor {
        service: ORDER_SERVICE,
        version: env!("CARGO_PKG_VERSION"),
        endpoints: vec![
            "GET /health",
            "GET /metrics",
            "POST /api/orders",
            "GET /api/orders",
            "GET /api/orders/{id}",
            "GET /api/resilience/stats",
        ],
    })
}

/// Inventory health: database reachability and fault injection switches
pub async fn inventory_health(
    State(state): State<InventoryState>,
) -> (StatusCode, Json<HealthResponse>) {
    let database_up = state.mutator.is_available().await;
    let flags = ChaosFlags {
        latency_enabled: state.injector.latency_policy().enabled,
        crash_enabled: state.injector.crash_policy().enabled,
    };
    health(INVENTORY_SERVICE, database_up, None, Some(flags))
}

/// Order health: database reachability and the inventory breaker state
pub async fn order_health(State(state): State<OrderState>) -> (StatusCode, Json<HealthResponse>) {
    let database_up = state.orders.is_available().await;
    let circuit = state.inventory.breaker().state();
    health(ORDER_SERVICE, database_up, Some(circuit), None)
}
