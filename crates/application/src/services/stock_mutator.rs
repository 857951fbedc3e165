//! Stock Mutator - Idempotent, non-negative stock changes
//!
//! Every change runs inside one storage transaction:
//!
//! 1. A mutation carrying a token first looks the token up in the ledger. A
//!    hit is returned as a replay and nothing is written.
//! 2. The stock item is loaded and the delta applied, refusing to go below
//!    zero.
//! 3. The new quantity and the mutation record are written and committed
//!    together.
//!
//! Two deliveries of the same token racing each other are resolved by the
//! ledger's unique constraint. The loser sees a token conflict, drops its
//! transaction and starts over, which turns it into a replay.

use std::sync::Arc;

use domain::{
    DomainError, IdempotencyToken, MutationOutcome, MutationRecord, ProductKey, StockItem,
    StockMutation,
};
use tracing::{debug, info, instrument, warn};

use crate::{
    error::ApplicationError,
    ports::{InsertOutcome, StockLedgerPort},
};

/// Default number of restarts after a storage conflict
pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 3;

enum Attempt {
    Done(MutationOutcome),
    TokenConflict,
}

/// Service applying stock mutations through the ledger
pub struct StockMutator {
    ledger: Arc<dyn StockLedgerPort>,
    max_conflict_retries: u32,
}

impl std::fmt::Debug for StockMutator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StockMutator")
            .field("max_conflict_retries", &self.max_conflict_retries)
            .finish_non_exhaustive()
    }
}

impl StockMutator {
    /// Create a new stock mutator
    pub fn new(ledger: Arc<dyn StockLedgerPort>) -> Self {
        Self {
            ledger,
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
        }
    }

    /// Set how many times a conflicting transaction is restarted
    #[must_use]
    pub const fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    /// Apply a mutation exactly once per idempotency token
    ///
    /// # Errors
    ///
    /// - `DomainError::NotFound` if the product does not exist
    /// - `DomainError::InsufficientResource` if the decrement would go below zero
    /// - `ApplicationError::Internal` if conflicts persist past the retry budget
    #[instrument(
        skip(self, mutation),
        fields(
            product_key = %mutation.product_key,
            delta = mutation.quantity_delta,
            token = ?mutation.idempotency_token.as_ref().map(IdempotencyToken::as_str),
        )
    )]
    pub async fn apply_mutation(
        &self,
        mutation: &StockMutation,
    ) -> Result<MutationOutcome, ApplicationError> {
        let mut conflicts = 0u32;

        loop {
            let reason = match self.try_apply(mutation).await {
                Ok(Attempt::Done(outcome)) => {
                    if outcome.replayed {
                        info!(record_id = %outcome.record.id, "Replayed committed mutation");
                    } else {
                        info!(
                            before = outcome.record.quantity_before,
                            after = outcome.record.quantity_after,
                            "Applied stock mutation"
                        );
                    }
                    return Ok(outcome);
                },
                Ok(Attempt::TokenConflict) => "idempotency token committed concurrently".to_string(),
                Err(ApplicationError::Conflict(message)) => message,
                Err(err) => return Err(err),
            };

            conflicts += 1;
            if conflicts > self.max_conflict_retries {
                warn!(conflicts, %reason, "Giving up on conflicting stock mutation");
                return Err(ApplicationError::Internal(format!(
                    "stock mutation still conflicting after {} retries: {reason}",
                    self.max_conflict_retries
                )));
            }
            debug!(conflicts, %reason, "Restarting stock mutation after conflict");
        }
    }

    async fn try_apply(&self, mutation: &StockMutation) -> Result<Attempt, ApplicationError> {
        let mut tx = self.ledger.begin().await?;

        if let Some(token) = &mutation.idempotency_token {
            if let Some(record) = tx.find_mutation(token).await? {
                return Ok(Attempt::Done(MutationOutcome::replayed(record)));
            }
        }

        let mut item = tx
            .load_item(&mutation.product_key)
            .await?
            .ok_or_else(|| DomainError::not_found("StockItem", mutation.product_key.as_str()))?;

        let before = item.apply_delta(mutation.quantity_delta)?;
        tx.store_quantity(&item.product_key, item.quantity).await?;

        let record = MutationRecord::for_mutation(mutation, before, item.quantity);
        match tx.insert_mutation(&record).await? {
            InsertOutcome::Inserted => {
                tx.commit().await?;
                Ok(Attempt::Done(MutationOutcome::applied(record)))
            },
            InsertOutcome::TokenConflict => Ok(Attempt::TokenConflict),
        }
    }

    /// Get a stock item
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` if the product does not exist.
    #[instrument(skip(self), fields(product_key = %key))]
    pub async fn get_item(&self, key: &ProductKey) -> Result<StockItem, ApplicationError> {
        self.ledger
            .get_item(key)
            .await?
            .ok_or_else(|| DomainError::not_found("StockItem", key.as_str()).into())
    }

    /// List all stock items ordered by product name
    #[instrument(skip(self))]
    pub async fn list_items(&self) -> Result<Vec<StockItem>, ApplicationError> {
        self.ledger.list_items().await
    }

    /// Look up the record committed under a token
    #[instrument(skip(self), fields(token = %token))]
    pub async fn find_mutation(
        &self,
        token: &IdempotencyToken,
    ) -> Result<Option<MutationRecord>, ApplicationError> {
        self.ledger.find_mutation(token).await
    }

    /// Check if the ledger storage is reachable
    pub async fn is_available(&self) -> bool {
        self.ledger.is_available().await
    }
}
