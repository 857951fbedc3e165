//! Inventory gateway port
//!
//! The order side's view of the remote inventory service. Errors keep the
//! distinction between a request that definitely did not take effect and
//! one whose outcome is unknown.

use async_trait::async_trait;
use domain::{IdempotencyToken, OrderId, ProductKey};
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Request to remove stock for an order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryReservation {
    pub product_key: ProductKey,
    pub quantity: u32,
    pub order_id: OrderId,
    /// Same value on every delivery of this reservation
    pub idempotency_token: Option<IdempotencyToken>,
}

/// Confirmation returned by the inventory service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryReceipt {
    pub product_key: String,
    pub quantity_before: i64,
    pub quantity_after: i64,
    /// The inventory service had already applied this token
    pub replayed: bool,
}

/// Inventory call failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InventoryGatewayError {
    /// The inventory service refused the request
    #[error("Inventory rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The circuit breaker is open and no request was sent
    #[error("Circuit breaker '{service}' is open")]
    CircuitOpen { service: String },

    /// Retries exhausted or the call timed out
    #[error("Inventory service temporarily unavailable (circuit {circuit_state}, {attempts} attempts): {message}")]
    Unavailable {
        message: String,
        circuit_state: String,
        attempts: u32,
    },
}

impl InventoryGatewayError {
    /// Whether the stock change may or may not have been applied
    pub const fn outcome_unknown(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// Whether the call failed fast on an open breaker
    pub const fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }
}

/// Port for the remote inventory service
#[cfg_attr(test, automock)]
#[async_trait]
pub trait InventoryGatewayPort: Send + Sync {
    /// Remove `quantity` units for an order
    async fn reserve(
        &self,
        reservation: &InventoryReservation,
    ) -> Result<InventoryReceipt, InventoryGatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailable_is_unknown() {
        let rejected = InventoryGatewayError::Rejected {
            status: 409,
            message: "Insufficient stock".into(),
        };
        let open = InventoryGatewayError::CircuitOpen {
            service: "inventory".into(),
        };
        let unavailable = InventoryGatewayError::Unavailable {
            message: "timeout".into(),
            circuit_state: "closed".into(),
            attempts: 4,
        };

        assert!(!rejected.outcome_unknown());
        assert!(!open.outcome_unknown());
        assert!(open.is_circuit_open());
        assert!(unavailable.outcome_unknown());
    }

    #[test]
    fn unavailable_message_includes_breaker_state() {
        let err = InventoryGatewayError::Unavailable {
            message: "HTTP 503".into(),
            circuit_state: "closed".into(),
            attempts: 4,
        };
        let text = err.to_string();
        assert!(text.contains("temporarily unavailable"));
        assert!(text.contains("closed"));
        assert!(text.contains("4 attempts"));
    }
}
