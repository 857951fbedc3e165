//! Order entity - A customer order whose fulfilment decrements stock

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    errors::DomainError,
    value_objects::{IdempotencyToken, OrderId, OrderStatus, ProductKey},
};

/// Step name appended to an order's token for the inventory call
pub const INVENTORY_STEP: &str = "inventory";

const MAX_CUSTOMER_ID_LEN: usize = 128;

/// A customer order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: String,
    pub product_key: ProductKey,
    pub product_name: String,
    pub quantity: u32,
    pub status: OrderStatus,
    /// Whether the inventory service confirmed the decrement
    pub inventory_updated: bool,
    pub idempotency_token: Option<IdempotencyToken>,
    /// Last inventory failure, cleared on success
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Create a validated order
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank customer or product name, an
    /// overlong customer id, or a zero quantity.
    pub fn new(
        customer_id: impl Into<String>,
        product_key: ProductKey,
        product_name: impl Into<String>,
        quantity: u32,
        idempotency_token: Option<IdempotencyToken>,
    ) -> Result<Self, DomainError> {
        let customer_id = customer_id.into().trim().to_string();
        let product_name = product_name.into().trim().to_string();

        if customer_id.is_empty() {
            return Err(DomainError::validation("customer id must not be blank"));
        }
        if customer_id.chars().count() > MAX_CUSTOMER_ID_LEN {
            return Err(DomainError::validation(format!(
                "customer id must be at most {MAX_CUSTOMER_ID_LEN} characters"
            )));
        }
        if product_name.is_empty() {
            return Err(DomainError::validation("product name must not be blank"));
        }
        if quantity == 0 {
            return Err(DomainError::validation("quantity must be at least 1"));
        }

        let now = Utc::now();
        Ok(Self {
            id: OrderId::new(),
            customer_id,
            product_key,
            product_name,
            quantity,
            status: OrderStatus::Validated,
            inventory_updated: false,
            idempotency_token,
            error_message: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Token to send with the inventory call
    ///
    /// Derived from the order's own token, or from the order id when the
    /// caller gave none, so every attempt for this order carries the same one.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the derived token is too long.
    pub fn inventory_token(&self) -> Result<IdempotencyToken, DomainError> {
        match &self.idempotency_token {
            Some(token) => token.derive(INVENTORY_STEP),
            None => IdempotencyToken::new(format!("{}-{INVENTORY_STEP}", self.id)),
        }
    }

    /// Record a confirmed inventory decrement
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` if the order is already shipped.
    pub fn mark_shipped(&mut self) -> Result<(), DomainError> {
        self.ensure_awaits_inventory(OrderStatus::Shipped)?;
        self.status = OrderStatus::Shipped;
        self.inventory_updated = true;
        self.error_message = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record a failed inventory step
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` if the order is already shipped.
    pub fn mark_failed(&mut self, message: impl Into<String>) -> Result<(), DomainError> {
        self.ensure_awaits_inventory(OrderStatus::Failed)?;
        self.status = OrderStatus::Failed;
        self.error_message = Some(message.into());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Whether the order has reached its final state
    pub const fn is_shipped(&self) -> bool {
        matches!(self.status, OrderStatus::Shipped)
    }

    fn ensure_awaits_inventory(&self, target: OrderStatus) -> Result<(), DomainError> {
        if self.status.awaits_inventory() {
            Ok(())
        } else {
            Err(DomainError::InvalidStateTransition(format!(
                "{} -> {target}",
                self.status
            )))
        }
    }
}
