//! Application services - Use case implementations

mod order_service;
mod stock_mutator;

pub use order_service::{InventoryFailure, OrderService, PlaceOrder, PlacedOrder};
pub use stock_mutator::{DEFAULT_MAX_CONFLICT_RETRIES, StockMutator};
