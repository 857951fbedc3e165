//! Stock item entity - A quantity of one product that can never go negative

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{errors::DomainError, value_objects::ProductKey};

/// Stock on hand for a single product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockItem {
    /// Unique product key
    pub product_key: ProductKey,
    /// Human-readable product name
    pub product_name: String,
    /// Units on hand, never negative
    pub quantity: i64,
    /// Last time the quantity changed
    pub updated_at: DateTime<Utc>,
}

impl StockItem {
    /// Create a stock item
    ///
    /// # Errors
    ///
    /// Returns a validation error for a negative quantity or a blank name.
    pub fn new(
        product_key: ProductKey,
        product_name: impl Into<String>,
        quantity: i64,
    ) -> Result<Self, DomainError> {
        let product_name = product_name.into();
        if product_name.trim().is_empty() {
            return Err(DomainError::validation("product name must not be blank"));
        }
        if quantity < 0 {
            return Err(DomainError::validation("quantity must not be negative"));
        }
        Ok(Self {
            product_key,
            product_name,
            quantity,
            updated_at: Utc::now(),
        })
    }

    /// Compute the quantity that applying `delta` would leave
    ///
    /// # Errors
    ///
    /// Returns `InsufficientResource` when the result would be negative and a
    /// validation error when it would overflow.
    pub fn quantity_after(&self, delta: i64) -> Result<i64, DomainError> {
        let next = self
            .quantity
            .checked_add(delta)
            .ok_or_else(|| DomainError::validation("quantity delta overflows stock level"))?;

        if next < 0 {
            return Err(DomainError::InsufficientResource {
                product_key: self.product_key.to_string(),
                available: self.quantity,
                requested: delta.saturating_neg(),
            });
        }
        Ok(next)
    }

    /// Apply `delta`, returning the quantity before the change
    ///
    /// Leaves the item untouched on error.
    pub fn apply_delta(&mut self, delta: i64) -> Result<i64, DomainError> {
        let next = self.quantity_after(delta)?;
        let before = self.quantity;
        self.quantity = next;
        self.updated_at = Utc::now();
        Ok(before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(quantity: i64) -> StockItem {
        StockItem::new(ProductKey::new("SKU-1").unwrap(), "Widget", quantity).unwrap()
    }

    #[test]
    fn rejects_negative_initial_quantity() {
        let result = StockItem::new(ProductKey::new("SKU-1").unwrap(), "Widget", -1);
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[test]
    fn rejects_blank_name() {
        let result = StockItem::new(ProductKey::new("SKU-1").unwrap(), " ", 1);
        assert!(result.is_err());
    }

    #[test]
    fn decrement_within_stock() {
        let mut stock = item(10);
        let before = stock.apply_delta(-5).unwrap();
        assert_eq!(before, 10);
        assert_eq!(stock.quantity, 5);
    }

    #[test]
    fn decrement_to_exactly_zero() {
        let mut stock = item(3);
        stock.apply_delta(-3).unwrap();
        assert_eq!(stock.quantity, 0);
    }

    #[test]
    fn overdraw_is_rejected_without_change() {
        let mut stock = item(5);
        let err = stock.apply_delta(-20).unwrap_err();
        assert_eq!(
            err,
            DomainError::InsufficientResource {
                product_key: "SKU-1".to_string(),
                available: 5,
                requested: 20,
            }
        );
        assert_eq!(stock.quantity, 5);
    }

    #[test]
    fn restock_increases_quantity() {
        let mut stock = item(0);
        stock.apply_delta(7).unwrap();
        assert_eq!(stock.quantity, 7);
    }

    #[test]
    fn overflow_is_a_validation_error() {
        let stock = item(i64::MAX);
        assert!(matches!(
            stock.quantity_after(1),
            Err(DomainError::ValidationError(_))
        ));
    }
}
