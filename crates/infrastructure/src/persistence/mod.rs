//! Persistence module
//!
//! SQLite storage for stock levels, the mutation ledger and orders.

pub mod async_connection;
pub mod error;
pub mod order_store;
pub mod stock_ledger;

pub use async_connection::{AsyncDatabase, AsyncDatabaseConfig, AsyncDatabaseError};
pub use error::{is_unique_violation, map_sqlx_error};
pub use order_store::SqliteOrderStore;
pub use stock_ledger::{SqliteStockLedger, SqliteStockTransaction};
