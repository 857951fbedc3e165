//! Order storage port

use async_trait::async_trait;
use domain::{IdempotencyToken, Order, OrderId, OrderStatus};
#[cfg(test)]
use mockall::automock;

use crate::error::ApplicationError;

/// Filter for listing orders
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderQuery {
    /// Only orders placed by this customer
    pub customer_id: Option<String>,
    /// Only orders in this status
    pub status: Option<OrderStatus>,
    /// Maximum number of orders to return
    pub limit: Option<u32>,
}

impl OrderQuery {
    /// Create an unfiltered query
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by customer
    #[must_use]
    pub fn with_customer(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    /// Filter by status
    #[must_use]
    pub const fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Limit the number of results
    #[must_use]
    pub const fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Port for order persistence
#[cfg_attr(test, automock)]
#[async_trait]
pub trait OrderStorePort: Send + Sync {
    /// Insert a new order
    ///
    /// Returns `ApplicationError::Conflict` if another order already holds
    /// the same idempotency token.
    async fn save(&self, order: &Order) -> Result<(), ApplicationError>;

    /// Persist status changes of an existing order
    ///
    /// A shipped order is final: returns `Ok(false)` without writing if the
    /// stored order is already shipped.
    async fn update(&self, order: &Order) -> Result<bool, ApplicationError>;

    /// Get an order by ID
    async fn get(&self, id: &OrderId) -> Result<Option<Order>, ApplicationError>;

    /// Find the order created with an idempotency token
    async fn find_by_idempotency_token(
        &self,
        token: &IdempotencyToken,
    ) -> Result<Option<Order>, ApplicationError>;

    /// List orders, newest first
    async fn list(&self, query: &OrderQuery) -> Result<Vec<Order>, ApplicationError>;

    /// Check if the storage is reachable
    async fn is_available(&self) -> bool;
}
