//! SQLite stock ledger
//!
//! Implements [`StockLedgerPort`] over the `stock_items` and
//! `mutation_records` tables. The `UNIQUE` constraint on
//! `mutation_records.idempotency_token` is what resolves two deliveries of
//! the same token racing each other.

use application::{
    error::ApplicationError,
    ports::{InsertOutcome, StockLedgerPort, StockTransaction},
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use domain::{IdempotencyToken, MutationRecord, ProductKey, StockItem};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::error::{is_unique_violation, map_sqlx_error};

const SELECT_MUTATION: &str = r"
    SELECT id, idempotency_token, product_key, quantity_delta, quantity_before,
           quantity_after, causal_id, reason, created_at
    FROM mutation_records WHERE idempotency_token = $1
";

const SELECT_ITEM: &str = r"
    SELECT product_key, product_name, quantity, updated_at
    FROM stock_items WHERE product_key = $1
";

/// SQLite-backed stock ledger
#[derive(Debug, Clone)]
pub struct SqliteStockLedger {
    pool: SqlitePool,
}

impl SqliteStockLedger {
    /// Create a new ledger over the given pool
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace a stock item
    ///
    /// Used for provisioning outside the mutation path.
    #[instrument(skip(self, item), fields(product_key = %item.product_key))]
    pub async fn upsert_item(&self, item: &StockItem) -> Result<(), ApplicationError> {
        sqlx::query(
            r"
            INSERT INTO stock_items (product_key, product_name, quantity, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT(product_key) DO UPDATE SET
                product_name = excluded.product_name,
                quantity = excluded.quantity,
                updated_at = excluded.updated_at
            ",
        )
        .bind(item.product_key.as_str())
        .bind(&item.product_name)
        .bind(item.quantity)
        .bind(timestamp(&item.updated_at))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    /// Count the mutation records written for a product
    pub async fn count_mutations(&self, key: &ProductKey) -> Result<i64, ApplicationError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM mutation_records WHERE product_key = $1")
            .bind(key.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }
}

#[async_trait]
impl StockLedgerPort for SqliteStockLedger {
    async fn begin(&self) -> Result<Box<dyn StockTransaction>, ApplicationError> {
        // Take the write lock up front so concurrent writers wait on busy_timeout
        let tx = self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(map_sqlx_error)?;
        Ok(Box::new(SqliteStockTransaction { tx }))
    }

    #[instrument(skip(self), fields(product_key = %key))]
    async fn get_item(&self, key: &ProductKey) -> Result<Option<StockItem>, ApplicationError> {
        let row: Option<StockItemRow> = sqlx::query_as(SELECT_ITEM)
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.map(StockItem::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn list_items(&self) -> Result<Vec<StockItem>, ApplicationError> {
        let rows: Vec<StockItemRow> = sqlx::query_as(
            r"
            SELECT product_key, product_name, quantity, updated_at
            FROM stock_items ORDER BY product_name ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        debug!(count = rows.len(), "Listed stock items");
        rows.into_iter().map(StockItem::try_from).collect()
    }

    #[instrument(skip(self), fields(token = %token))]
    async fn find_mutation(
        &self,
        token: &IdempotencyToken,
    ) -> Result<Option<MutationRecord>, ApplicationError> {
        let row: Option<MutationRecordRow> = sqlx::query_as(SELECT_MUTATION)
            .bind(token.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.map(MutationRecord::try_from).transpose()
    }

    async fn is_available(&self) -> bool {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }
}

/// An open ledger transaction
///
/// Dropping it without [`StockTransaction::commit`] rolls back.
pub struct SqliteStockTransaction {
    tx: Transaction<'static, Sqlite>,
}

impl std::fmt::Debug for SqliteStockTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStockTransaction").finish_non_exhaustive()
    }
}

#[async_trait]
impl StockTransaction for SqliteStockTransaction {
    async fn find_mutation(
        &mut self,
        token: &IdempotencyToken,
    ) -> Result<Option<MutationRecord>, ApplicationError> {
        let row: Option<MutationRecordRow> = sqlx::query_as(SELECT_MUTATION)
            .bind(token.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        row.map(MutationRecord::try_from).transpose()
    }

    async fn load_item(&mut self, key: &ProductKey) -> Result<Option<StockItem>, ApplicationError> {
        let row: Option<StockItemRow> = sqlx::query_as(SELECT_ITEM)
            .bind(key.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        row.map(StockItem::try_from).transpose()
    }

    async fn store_quantity(
        &mut self,
        key: &ProductKey,
        quantity: i64,
    ) -> Result<(), ApplicationError> {
        let result = sqlx::query(
            "UPDATE stock_items SET quantity = $1, updated_at = $2 WHERE product_key = $3",
        )
        .bind(quantity)
        .bind(timestamp(&Utc::now()))
        .bind(key.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(ApplicationError::NotFound(format!("Product {key}")));
        }
        Ok(())
    }

    async fn insert_mutation(
        &mut self,
        record: &MutationRecord,
    ) -> Result<InsertOutcome, ApplicationError> {
        let result = sqlx::query(
            r"
            INSERT INTO mutation_records
                (id, idempotency_token, product_key, quantity_delta, quantity_before,
                 quantity_after, causal_id, reason, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(record.id.to_string())
        .bind(record.idempotency_token.as_ref().map(IdempotencyToken::as_str))
        .bind(record.product_key.as_str())
        .bind(record.quantity_delta)
        .bind(record.quantity_before)
        .bind(record.quantity_after)
        .bind(record.causal_id.as_deref())
        .bind(&record.reason)
        .bind(timestamp(&record.created_at))
        .execute(&mut *self.tx)
        .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(e) if is_unique_violation(&e) => {
                debug!(record_id = %record.id, "Idempotency token already recorded");
                Ok(InsertOutcome::TokenConflict)
            },
            Err(e) => Err(map_sqlx_error(e)),
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), ApplicationError> {
        self.tx.commit().await.map_err(map_sqlx_error)
    }
}

#[derive(sqlx::FromRow)]
struct StockItemRow {
    product_key: String,
    product_name: String,
    quantity: i64,
    updated_at: String,
}

impl TryFrom<StockItemRow> for StockItem {
    type Error = ApplicationError;

    fn try_from(row: StockItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            product_key: parse_product_key(row.product_key)?,
            product_name: row.product_name,
            quantity: row.quantity,
            updated_at: parse_datetime(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MutationRecordRow {
    id: String,
    idempotency_token: Option<String>,
    product_key: String,
    quantity_delta: i64,
    quantity_before: i64,
    quantity_after: i64,
    causal_id: Option<String>,
    reason: String,
    created_at: String,
}

impl TryFrom<MutationRecordRow> for MutationRecord {
    type Error = ApplicationError;

    fn try_from(row: MutationRecordRow) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| ApplicationError::Internal(format!("Invalid mutation id: {e}")))?;
        let idempotency_token = row
            .idempotency_token
            .map(IdempotencyToken::new)
            .transpose()
            .map_err(|e| ApplicationError::Internal(format!("Stored token is invalid: {e}")))?;
        Ok(Self {
            id,
            idempotency_token,
            product_key: parse_product_key(row.product_key)?,
            quantity_delta: row.quantity_delta,
            quantity_before: row.quantity_before,
            quantity_after: row.quantity_after,
            causal_id: row.causal_id,
            reason: row.reason,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}

fn parse_product_key(raw: String) -> Result<ProductKey, ApplicationError> {
    ProductKey::new(raw)
        .map_err(|e| ApplicationError::Internal(format!("Stored product key is invalid: {e}")))
}

/// Fixed-width timestamps keep lexical and chronological order aligned
pub(super) fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(super) fn parse_datetime(raw: &str) -> Result<DateTime<Utc>, ApplicationError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ApplicationError::Internal(format!("Invalid timestamp {raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::AsyncDatabase;

    async fn ledger() -> SqliteStockLedger {
        let db = AsyncDatabase::in_memory().await.unwrap();
        db.migrate().await.unwrap();
        SqliteStockLedger::new(db.pool().clone())
    }

    fn key(raw: &str) -> ProductKey {
        ProductKey::new(raw).unwrap()
    }

    #[tokio::test]
    async fn lists_seeded_items_by_name() {
        let ledger = ledger().await;
        let items = ledger.list_items().await.unwrap();
        assert!(!items.is_empty());
        let names: Vec<_> = items.iter().map(|i| i.product_name.clone()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[tokio::test]
    async fn uncommitted_transaction_rolls_back() {
        let ledger = ledger().await;
        let before = ledger.get_item(&key("SKU-1")).await.unwrap().unwrap();
        {
            let mut tx = ledger.begin().await.unwrap();
            tx.store_quantity(&key("SKU-1"), before.quantity + 100)
                .await
                .unwrap();
        }
        let after = ledger.get_item(&key("SKU-1")).await.unwrap().unwrap();
        assert_eq!(after.quantity, before.quantity);
    }

    #[tokio::test]
    async fn duplicate_token_reports_conflict() {
        let ledger = ledger().await;
        let token = IdempotencyToken::new("tok-dup").unwrap();
        let mutation = domain::StockMutation::decrement(key("SKU-2"), 1)
            .unwrap()
            .with_token(token.clone());

        let mut tx = ledger.begin().await.unwrap();
        let first = MutationRecord::for_mutation(&mutation, 25, 24);
        assert_eq!(tx.insert_mutation(&first).await.unwrap(), InsertOutcome::Inserted);
        tx.commit().await.unwrap();

        let mut tx = ledger.begin().await.unwrap();
        let second = MutationRecord::for_mutation(&mutation, 24, 23);
        assert_eq!(
            tx.insert_mutation(&second).await.unwrap(),
            InsertOutcome::TokenConflict
        );
        drop(tx);

        let stored = ledger.find_mutation(&token).await.unwrap().unwrap();
        assert_eq!(stored.id, first.id);
        assert_eq!(stored.quantity_after, 24);
    }

    #[tokio::test]
    async fn stored_timestamps_have_fixed_width() {
        let ledger = ledger().await;
        let mutation = domain::StockMutation::decrement(key("SKU-2"), 1)
            .unwrap()
            .with_token(IdempotencyToken::new("tok-width").unwrap());

        let mut tx = ledger.begin().await.unwrap();
        tx.store_quantity(&key("SKU-2"), 24).await.unwrap();
        tx.insert_mutation(&MutationRecord::for_mutation(&mutation, 25, 24))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let (created_at,): (String,) = sqlx::query_as(
            "SELECT created_at FROM mutation_records WHERE idempotency_token = 'tok-width'",
        )
        .fetch_one(&ledger.pool)
        .await
        .unwrap();
        let (updated_at,): (String,) =
            sqlx::query_as("SELECT updated_at FROM stock_items WHERE product_key = 'SKU-2'")
                .fetch_one(&ledger.pool)
                .await
                .unwrap();

        for raw in [created_at, updated_at] {
            assert_eq!(raw.len(), "2024-01-01T00:00:00.000000Z".len(), "{raw}");
            assert!(raw.ends_with('Z'), "{raw}");
        }
    }

    #[tokio::test]
    async fn storing_unknown_item_is_not_found() {
        let ledger = ledger().await;
        let mut tx = ledger.begin().await.unwrap();
        let err = tx.store_quantity(&key("NOPE"), 1).await.unwrap_err();
        assert!(matches!(err, ApplicationError::NotFound(_)));
    }

    #[tokio::test]
    async fn upsert_provisions_items() {
        let ledger = ledger().await;
        let item = StockItem::new(key("SKU-NEW"), "Fresh", 7).unwrap();
        ledger.upsert_item(&item).await.unwrap();
        let loaded = ledger.get_item(&key("SKU-NEW")).await.unwrap().unwrap();
        assert_eq!(loaded.quantity, 7);
        assert_eq!(ledger.count_mutations(&key("SKU-NEW")).await.unwrap(), 0);
        assert!(ledger.is_available().await);
    }
}
