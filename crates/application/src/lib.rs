//! Application layer - Use cases and orchestration
//!
//! Contains the stock mutation and order placement use cases and the port
//! definitions they run against. Infrastructure adapters implement the ports.

pub mod error;
pub mod ports;
pub mod services;

pub use error::ApplicationError;
pub use ports::*;
pub use services::*;
