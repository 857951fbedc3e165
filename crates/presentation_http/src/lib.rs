//! StockGuard HTTP presentation layer
//!
//! Routers, middleware and handlers for the inventory and order services,
//! plus the bootstrap shared by their binaries.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use handlers::metrics::MetricsCollector;
pub use middleware::{FaultInjectionLayer, RequestTrackingLayer, ValidatedJson};
pub use routes::{create_inventory_router, create_order_router};
pub use state::{InventoryState, OrderState};
