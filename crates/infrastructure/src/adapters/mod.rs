//! Infrastructure adapters
//!
//! Adapters connect application ports to concrete implementations.

pub mod circuit_breaker;
mod inventory_client;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerStats, CircuitEvent,
    CircuitOpenError, CircuitState, CumulativeStats, RollingStats,
};
pub use inventory_client::{
    ClientError, IDEMPOTENCY_KEY_HEADER, InventoryClientConfig, ResilienceConfigSnapshot,
    ResilienceStats, ResilientInventoryClient, UPDATE_PATH, X_REQUEST_ID,
};
