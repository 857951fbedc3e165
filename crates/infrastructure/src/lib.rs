//! Infrastructure layer - Adapters for external systems
//!
//! Implements the application ports: SQLite persistence for the stock
//! ledger and orders, and the resilient HTTP client for the inventory
//! service. Also hosts the circuit breaker, retry, fault injection,
//! configuration and logging setup shared by both services.

pub mod adapters;
pub mod chaos;
pub mod config;
pub mod persistence;
pub mod retry;
pub mod telemetry;

pub use adapters::*;
pub use chaos::{CrashMode, CrashPolicy, FaultInjector, LatencyPolicy, TriggerPattern};
pub use config::{AppConfig, ConfigValidationError, DatabaseConfig, LoggingConfig, ServerConfig};
pub use persistence::{AsyncDatabase, AsyncDatabaseConfig, SqliteOrderStore, SqliteStockLedger};
pub use retry::{RetryConfig, RetryResult, Retryable, retry, with_retry};
pub use telemetry::init_tracing;
