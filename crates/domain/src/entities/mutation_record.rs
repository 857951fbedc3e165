//! Stock mutations and the immutable records they leave behind
//!
//! A [`MutationRecord`] is written exactly once per successful logical
//! mutation. When the mutation carried an idempotency token, the record is
//! also the ledger entry that turns later deliveries of the same token into
//! a lookup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    errors::DomainError,
    value_objects::{IdempotencyToken, ProductKey},
};

/// Reason recorded for decrements unless the caller supplies one
pub const REASON_ORDER_SHIPPED: &str = "order_shipped";
/// Reason recorded for increments unless the caller supplies one
pub const REASON_RESTOCK: &str = "restock";

/// A requested change to a stock level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMutation {
    /// Product to change
    pub product_key: ProductKey,
    /// Signed change, negative for a decrement
    pub quantity_delta: i64,
    /// Originating order reference
    pub causal_id: Option<String>,
    /// Token identifying this logical mutation across retries
    pub idempotency_token: Option<IdempotencyToken>,
    /// Free-text reason
    pub reason: Option<String>,
}

impl StockMutation {
    /// Create a mutation
    ///
    /// # Errors
    ///
    /// Returns a validation error if `quantity_delta` is zero.
    pub fn new(product_key: ProductKey, quantity_delta: i64) -> Result<Self, DomainError> {
        if quantity_delta == 0 {
            return Err(DomainError::validation("quantity delta must not be zero"));
        }
        Ok(Self {
            product_key,
            quantity_delta,
            causal_id: None,
            idempotency_token: None,
            reason: None,
        })
    }

    /// Create a decrement of `amount` units
    ///
    /// # Errors
    ///
    /// Returns a validation error unless `amount` is positive.
    pub fn decrement(product_key: ProductKey, amount: i64) -> Result<Self, DomainError> {
        if amount <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        Self::new(product_key, -amount)
    }

    /// Attach the originating order reference
    ///
    /// # Errors
    ///
    /// Returns a validation error if the reference is blank.
    pub fn with_causal_id(mut self, causal_id: impl Into<String>) -> Result<Self, DomainError> {
        let causal_id = causal_id.into();
        if causal_id.trim().is_empty() {
            return Err(DomainError::validation("causal id must not be blank"));
        }
        self.causal_id = Some(causal_id);
        Ok(self)
    }

    /// Attach an idempotency token
    #[must_use]
    pub fn with_token(mut self, token: IdempotencyToken) -> Self {
        self.idempotency_token = Some(token);
        self
    }

    /// Attach a reason
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Reason to record, defaulting by the sign of the delta
    pub fn effective_reason(&self) -> &str {
        match self.reason.as_deref() {
            Some(reason) => reason,
            None if self.quantity_delta < 0 => REASON_ORDER_SHIPPED,
            None => REASON_RESTOCK,
        }
    }
}

/// Immutable ledger entry for one applied mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationRecord {
    pub id: Uuid,
    pub idempotency_token: Option<IdempotencyToken>,
    pub product_key: ProductKey,
    pub quantity_delta: i64,
    pub quantity_before: i64,
    pub quantity_after: i64,
    pub causal_id: Option<String>,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl MutationRecord {
    /// Build the record for a mutation that moved stock from `before` to `after`
    pub fn for_mutation(mutation: &StockMutation, quantity_before: i64, quantity_after: i64) -> Self {
        Self {
            id: Uuid::now_v7(),
            idempotency_token: mutation.idempotency_token.clone(),
            product_key: mutation.product_key.clone(),
            quantity_delta: mutation.quantity_delta,
            quantity_before,
            quantity_after,
            causal_id: mutation.causal_id.clone(),
            reason: mutation.effective_reason().to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Result of applying a mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationOutcome {
    /// The record that describes the applied change
    pub record: MutationRecord,
    /// True when the record already existed and nothing new was committed
    pub replayed: bool,
}

impl MutationOutcome {
    /// A freshly committed mutation
    pub const fn applied(record: MutationRecord) -> Self {
        Self {
            record,
            replayed: false,
        }
    }

    /// A previously committed mutation found by its token
    pub const fn replayed(record: MutationRecord) -> Self {
        Self {
            record,
            replayed: true,
        }
    }
}
