//! Port definitions for application layer
//!
//! Ports are interfaces that define how the application interacts with
//! external systems. Adapters in the infrastructure layer implement these ports.

mod inventory_gateway;
mod order_store;
mod stock_ledger;

#[cfg(test)]
pub use inventory_gateway::MockInventoryGatewayPort;
pub use inventory_gateway::{
    InventoryGatewayError, InventoryGatewayPort, InventoryReceipt, InventoryReservation,
};
#[cfg(test)]
pub use order_store::MockOrderStorePort;
pub use order_store::{OrderQuery, OrderStorePort};
pub use stock_ledger::{InsertOutcome, StockLedgerPort, StockTransaction};
