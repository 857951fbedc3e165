//! Stock ledger port
//!
//! Transactional access to stock items and the idempotency ledger of
//! mutation records. All writes to a stock level go through a
//! [`StockTransaction`] so the quantity and its record commit together.

use async_trait::async_trait;
use domain::{IdempotencyToken, MutationRecord, ProductKey, StockItem};

use crate::error::ApplicationError;

/// Result of inserting a mutation record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The record was staged in the transaction
    Inserted,
    /// Another transaction already committed a record with the same token
    TokenConflict,
}

/// An open storage transaction
///
/// Dropping the transaction without calling [`StockTransaction::commit`]
/// rolls back everything staged in it.
#[async_trait]
pub trait StockTransaction: Send {
    /// Look up a committed mutation record by idempotency token
    async fn find_mutation(
        &mut self,
        token: &IdempotencyToken,
    ) -> Result<Option<MutationRecord>, ApplicationError>;

    /// Load a stock item
    async fn load_item(&mut self, key: &ProductKey) -> Result<Option<StockItem>, ApplicationError>;

    /// Overwrite the quantity of a stock item
    async fn store_quantity(&mut self, key: &ProductKey, quantity: i64)
    -> Result<(), ApplicationError>;

    /// Insert a mutation record, reporting a token collision instead of failing
    async fn insert_mutation(
        &mut self,
        record: &MutationRecord,
    ) -> Result<InsertOutcome, ApplicationError>;

    /// Commit all staged writes atomically
    async fn commit(self: Box<Self>) -> Result<(), ApplicationError>;
}

/// Port for stock storage
#[async_trait]
pub trait StockLedgerPort: Send + Sync {
    /// Open a new transaction
    async fn begin(&self) -> Result<Box<dyn StockTransaction>, ApplicationError>;

    /// Get a stock item by key
    async fn get_item(&self, key: &ProductKey) -> Result<Option<StockItem>, ApplicationError>;

    /// List all stock items ordered by product name
    async fn list_items(&self) -> Result<Vec<StockItem>, ApplicationError>;

    /// Look up a committed mutation record by idempotency token
    async fn find_mutation(
        &self,
        token: &IdempotencyToken,
    ) -> Result<Option<MutationRecord>, ApplicationError>;

    /// Check if the storage is reachable
    async fn is_available(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_object_safe(_: &dyn StockLedgerPort, _: &dyn StockTransaction) {}

    #[test]
    fn ports_are_send() {
        fn assert_send<T: Send + ?Sized>() {}
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send::<dyn StockTransaction>();
        assert_send_sync::<dyn StockLedgerPort>();
    }
}
