//! HTTP request handlers

pub mod gremlin;
pub mod health;
pub mod inventory;
pub mod metrics;
pub mod orders;
pub mod resilience;
