//! Domain-level errors

use thiserror::Error;

/// Errors that can occur in the domain layer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// Entity not found
    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: String, id: String },

    /// Applying a delta would drive a quantity below zero
    #[error(
        "Insufficient stock for {product_key}: available {available}, requested {requested}"
    )]
    InsufficientResource {
        product_key: String,
        available: i64,
        requested: i64,
    },

    /// Validation failed
    #[error("Validation failed: {0}")]
    ValidationError(String),

    /// Entity is not in a state that allows the requested change
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
}

impl DomainError {
    /// Create a not found error
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    /// Whether the error describes a request that can never succeed as sent
    pub const fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::ValidationError(_) | Self::InsufficientResource { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_creates_correct_error() {
        let err = DomainError::not_found("StockItem", "SKU-1");
        match err {
            DomainError::NotFound { entity_type, id } => {
                assert_eq!(entity_type, "StockItem");
                assert_eq!(id, "SKU-1");
            },
            _ => unreachable!("Expected NotFound error"),
        }
    }

    #[test]
    fn not_found_error_message_is_correct() {
        let err = DomainError::not_found("Order", "123");
        assert_eq!(err.to_string(), "Order not found: 123");
    }

    #[test]
    fn insufficient_resource_message() {
        let err = DomainError::InsufficientResource {
            product_key: "SKU-1".to_string(),
            available: 5,
            requested: 20,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for SKU-1: available 5, requested 20"
        );
    }

    #[test]
    fn validation_error_message() {
        let err = DomainError::validation("quantity_delta must not be zero");
        assert_eq!(
            err.to_string(),
            "Validation failed: quantity_delta must not be zero"
        );
    }

    #[test]
    fn invalid_state_transition_message() {
        let err = DomainError::InvalidStateTransition("shipped -> failed".to_string());
        assert_eq!(err.to_string(), "Invalid state transition: shipped -> failed");
    }

    #[test]
    fn permanent_errors() {
        assert!(DomainError::not_found("StockItem", "x").is_permanent());
        assert!(DomainError::validation("bad").is_permanent());
        assert!(
            DomainError::InsufficientResource {
                product_key: "x".to_string(),
                available: 0,
                requested: 1,
            }
            .is_permanent()
        );
        assert!(!DomainError::InvalidStateTransition("x".to_string()).is_permanent());
    }
}
