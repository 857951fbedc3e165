//! SQLite order store
//!
//! Implements [`OrderStorePort`] over the `orders` table.

use application::{
    error::ApplicationError,
    ports::{OrderQuery, OrderStorePort},
};
use async_trait::async_trait;
use domain::{IdempotencyToken, Order, OrderId, OrderStatus, ProductKey};
use sqlx::SqlitePool;
use tracing::{debug, instrument};

use super::{
    error::{is_unique_violation, map_sqlx_error},
    stock_ledger::{parse_datetime, timestamp},
};

const ORDER_COLUMNS: &str = "id, customer_id, product_key, product_name, quantity, status, \
     inventory_updated, idempotency_token, error_message, created_at, updated_at";

/// SQLite-backed order store
#[derive(Debug, Clone)]
pub struct SqliteOrderStore {
    pool: SqlitePool,
}

impl SqliteOrderStore {
    /// Create a new order store over the given pool
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStorePort for SqliteOrderStore {
    #[instrument(skip(self, order), fields(order_id = %order.id))]
    async fn save(&self, order: &Order) -> Result<(), ApplicationError> {
        let result = sqlx::query(
            r"
            INSERT INTO orders
                (id, customer_id, product_key, product_name, quantity, status,
                 inventory_updated, idempotency_token, error_message, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ",
        )
        .bind(order.id.to_string())
        .bind(&order.customer_id)
        .bind(order.product_key.as_str())
        .bind(&order.product_name)
        .bind(i64::from(order.quantity))
        .bind(order.status.as_str())
        .bind(order.inventory_updated)
        .bind(order.idempotency_token.as_ref().map(IdempotencyToken::as_str))
        .bind(order.error_message.as_deref())
        .bind(timestamp(&order.created_at))
        .bind(timestamp(&order.updated_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!("Order saved");
                Ok(())
            },
            Err(e) if is_unique_violation(&e) => Err(ApplicationError::Conflict(format!(
                "Order {} or its idempotency key already exists",
                order.id
            ))),
            Err(e) => Err(map_sqlx_error(e)),
        }
    }

    #[instrument(skip(self, order), fields(order_id = %order.id, status = %order.status))]
    async fn update(&self, order: &Order) -> Result<bool, ApplicationError> {
        let result = sqlx::query(
            r"
            UPDATE orders SET
                status = $1,
                inventory_updated = $2,
                error_message = $3,
                updated_at = $4
            WHERE id = $5 AND status != 'shipped'
            ",
        )
        .bind(order.status.as_str())
        .bind(order.inventory_updated)
        .bind(order.error_message.as_deref())
        .bind(timestamp(&order.updated_at))
        .bind(order.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        match self.get(&order.id).await? {
            Some(_) => {
                debug!("Order already shipped, update skipped");
                Ok(false)
            },
            None => Err(ApplicationError::NotFound(format!("Order {}", order.id))),
        }
    }

    #[instrument(skip(self), fields(order_id = %id))]
    async fn get(&self, id: &OrderId) -> Result<Option<Order>, ApplicationError> {
        let row: Option<OrderRow> =
            sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        row.map(Order::try_from).transpose()
    }

    #[instrument(skip(self), fields(token = %token))]
    async fn find_by_idempotency_token(
        &self,
        token: &IdempotencyToken,
    ) -> Result<Option<Order>, ApplicationError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE idempotency_token = $1"
        ))
        .bind(token.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        row.map(Order::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn list(&self, query: &OrderQuery) -> Result<Vec<Order>, ApplicationError> {
        // SQLite treats a negative LIMIT as unbounded
        let limit = query.limit.map_or(-1, i64::from);
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            r"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE ($1 IS NULL OR customer_id = $1)
              AND ($2 IS NULL OR status = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3
            "
        ))
        .bind(query.customer_id.as_deref())
        .bind(query.status.map(|s| s.as_str()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        debug!(count = rows.len(), "Listed orders");
        rows.into_iter().map(Order::try_from).collect()
    }

    async fn is_available(&self) -> bool {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: String,
    customer_id: String,
    product_key: String,
    product_name: String,
    quantity: i64,
    status: String,
    inventory_updated: bool,
    idempotency_token: Option<String>,
    error_message: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<OrderRow> for Order {
    type Error = ApplicationError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let corrupt = |what: &str, e: &dyn std::fmt::Display| {
            ApplicationError::Internal(format!("Stored order has invalid {what}: {e}"))
        };
        Ok(Self {
            id: OrderId::parse(&row.id).map_err(|e| corrupt("id", &e))?,
            customer_id: row.customer_id,
            product_key: ProductKey::new(row.product_key).map_err(|e| corrupt("product key", &e))?,
            product_name: row.product_name,
            quantity: u32::try_from(row.quantity).map_err(|e| corrupt("quantity", &e))?,
            status: row
                .status
                .parse::<OrderStatus>()
                .map_err(|e| corrupt("status", &e))?,
            inventory_updated: row.inventory_updated,
            idempotency_token: row
                .idempotency_token
                .map(IdempotencyToken::new)
                .transpose()
                .map_err(|e| corrupt("idempotency key", &e))?,
            error_message: row.error_message,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
        })
    }
}
