//! Order Service - Places orders and drives the inventory step
//!
//! An order is persisted as `validated` before the inventory service is
//! called, so a crash between the two steps leaves a record that a retry
//! with the same idempotency key can resume. The inventory call carries a
//! token derived from the order's key, which makes the resumed call a replay
//! on the inventory side when the first delivery had already committed.

use std::sync::Arc;

use domain::{DomainError, IdempotencyToken, Order, OrderId, ProductKey};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::{
    error::ApplicationError,
    ports::{
        InventoryGatewayError, InventoryGatewayPort, InventoryReceipt, InventoryReservation,
        OrderQuery, OrderStorePort,
    },
};

/// Input for placing an order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceOrder {
    pub customer_id: String,
    pub product_key: String,
    pub product_name: String,
    pub quantity: u32,
    pub idempotency_key: Option<String>,
}

/// Why the inventory step failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryFailure {
    pub message: String,
    /// The call failed fast on an open breaker
    pub circuit_open: bool,
    /// The stock change may have been applied anyway
    pub outcome_unknown: bool,
}

impl From<&InventoryGatewayError> for InventoryFailure {
    fn from(err: &InventoryGatewayError) -> Self {
        Self {
            message: err.to_string(),
            circuit_open: err.is_circuit_open(),
            outcome_unknown: err.outcome_unknown(),
        }
    }
}

/// Result of placing an order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedOrder {
    pub order: Order,
    /// The key matched an already shipped order, nothing was done
    pub replayed: bool,
    pub inventory_update: Option<InventoryReceipt>,
    pub inventory_error: Option<InventoryFailure>,
}

impl PlacedOrder {
    fn replay(order: Order) -> Self {
        Self {
            order,
            replayed: true,
            inventory_update: None,
            inventory_error: None,
        }
    }
}

/// Service for placing and querying orders
pub struct OrderService {
    store: Arc<dyn OrderStorePort>,
    inventory: Arc<dyn InventoryGatewayPort>,
}

impl std::fmt::Debug for OrderService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderService").finish_non_exhaustive()
    }
}

impl OrderService {
    /// Create a new order service
    pub fn new(store: Arc<dyn OrderStorePort>, inventory: Arc<dyn InventoryGatewayPort>) -> Self {
        Self { store, inventory }
    }

    /// Place an order and decrement inventory for it
    ///
    /// Inventory failures do not fail the call: the order is stored as
    /// `failed` and the failure is reported in [`PlacedOrder::inventory_error`].
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed input and storage errors as-is.
    #[instrument(
        skip(self, request),
        fields(customer_id = %request.customer_id, product_key = %request.product_key)
    )]
    pub async fn place_order(&self, request: PlaceOrder) -> Result<PlacedOrder, ApplicationError> {
        let token = request
            .idempotency_key
            .as_deref()
            .map(IdempotencyToken::new)
            .transpose()?;
        let product_key = ProductKey::new(request.product_key)?;

        if let Some(token) = &token {
            if let Some(existing) = self.store.find_by_idempotency_token(token).await? {
                return self.resume(existing).await;
            }
        }

        let order = Order::new(
            request.customer_id,
            product_key,
            request.product_name,
            request.quantity,
            token.clone(),
        )?;

        match self.store.save(&order).await {
            Ok(()) => {
                info!(order_id = %order.id, "Order validated");
                self.fulfil(order).await
            },
            Err(ApplicationError::Conflict(reason)) => {
                let Some(token) = token else {
                    return Err(ApplicationError::Conflict(reason));
                };
                let existing = self
                    .store
                    .find_by_idempotency_token(&token)
                    .await?
                    .ok_or(ApplicationError::Conflict(reason))?;
                self.resume(existing).await
            },
            Err(err) => Err(err),
        }
    }

    async fn resume(&self, existing: Order) -> Result<PlacedOrder, ApplicationError> {
        if existing.is_shipped() {
            info!(order_id = %existing.id, "Replaying shipped order");
            return Ok(PlacedOrder::replay(existing));
        }
        info!(order_id = %existing.id, status = %existing.status, "Resuming order");
        self.fulfil(existing).await
    }

    async fn fulfil(&self, mut order: Order) -> Result<PlacedOrder, ApplicationError> {
        let reservation = InventoryReservation {
            product_key: order.product_key.clone(),
            quantity: order.quantity,
            order_id: order.id,
            idempotency_token: Some(order.inventory_token()?),
        };

        match self.inventory.reserve(&reservation).await {
            Ok(receipt) => {
                order.mark_shipped()?;
                if !self.store.update(&order).await? {
                    return self.shipped_elsewhere(&order.id).await;
                }
                info!(
                    order_id = %order.id,
                    replayed = receipt.replayed,
                    quantity_after = receipt.quantity_after,
                    "Order shipped"
                );
                Ok(PlacedOrder {
                    order,
                    replayed: false,
                    inventory_update: Some(receipt),
                    inventory_error: None,
                })
            },
            Err(err) => {
                warn!(
                    order_id = %order.id,
                    error = %err,
                    outcome_unknown = err.outcome_unknown(),
                    "Inventory step failed"
                );
                order.mark_failed(err.to_string())?;
                if !self.store.update(&order).await? {
                    return self.shipped_elsewhere(&order.id).await;
                }
                Ok(PlacedOrder {
                    order,
                    replayed: false,
                    inventory_update: None,
                    inventory_error: Some(InventoryFailure::from(&err)),
                })
            },
        }
    }

    /// A concurrent request with the same key shipped the order first
    async fn shipped_elsewhere(&self, id: &OrderId) -> Result<PlacedOrder, ApplicationError> {
        let stored = self.get_order(id).await?;
        info!(order_id = %id, "Order already shipped by a concurrent request");
        Ok(PlacedOrder::replay(stored))
    }

    /// Get an order by ID
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` if no such order exists.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn get_order(&self, id: &OrderId) -> Result<Order, ApplicationError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Order", id.to_string()).into())
    }

    /// List orders, newest first
    #[instrument(skip(self))]
    pub async fn list_orders(&self, query: &OrderQuery) -> Result<Vec<Order>, ApplicationError> {
        self.store.list(query).await
    }

    /// Check if the order storage is reachable
    pub async fn is_available(&self) -> bool {
        self.store.is_available().await
    }
}

#[cfg(test)]
mod tests {
    use domain::OrderStatus;
    use mockall::predicate::always;

    use super::*;
    use crate::ports::{MockInventoryGatewayPort, MockOrderStorePort};

    fn request(key: Option<&str>) -> PlaceOrder {
        PlaceOrder {
            customer_id: "cust-1".into(),
            product_key: "SKU-1".into(),
            product_name: "Widget".into(),
            quantity: 2,
            idempotency_key: key.map(str::to_string),
        }
    }

    fn receipt(replayed: bool) -> InventoryReceipt {
        InventoryReceipt {
            product_key: "SKU-1".into(),
            quantity_before: 10,
            quantity_after: 8,
            replayed,
        }
    }

    fn existing(status: OrderStatus) -> Order {
        let mut order = Order::new(
            "cust-1",
            ProductKey::new("SKU-1").unwrap(),
            "Widget",
            2,
            Some(IdempotencyToken::new("order-1").unwrap()),
        )
        .unwrap();
        match status {
            OrderStatus::Shipped => order.mark_shipped().unwrap(),
            OrderStatus::Failed => order.mark_failed("earlier").unwrap(),
            _ => {},
        }
        order
    }

    fn service(store: MockOrderStorePort, inventory: MockInventoryGatewayPort) -> OrderService {
        OrderService::new(Arc::new(store), Arc::new(inventory))
    }

    #[tokio::test]
    async fn ships_order_on_inventory_success() {
        let mut store = MockOrderStorePort::new();
        store
            .expect_find_by_idempotency_token()
            .returning(|_| Ok(None));
        store.expect_save().times(1).returning(|_| Ok(()));
        store
            .expect_update()
            .withf(|order| order.status == OrderStatus::Shipped && order.inventory_updated)
            .times(1)
            .returning(|_| Ok(true));

        let mut inventory = MockInventoryGatewayPort::new();
        inventory
            .expect_reserve()
            .withf(|r| {
                r.quantity == 2
                    && r.idempotency_token.as_ref().map(IdempotencyToken::as_str)
                        == Some("order-1-inventory")
            })
            .times(1)
            .returning(|_| Ok(receipt(false)));

        let placed = service(store, inventory)
            .place_order(request(Some("order-1")))
            .await
            .unwrap();

        assert!(!placed.replayed);
        assert_eq!(placed.order.status, OrderStatus::Shipped);
        assert_eq!(placed.inventory_update, Some(receipt(false)));
        assert!(placed.inventory_error.is_none());
    }

    #[tokio::test]
    async fn inventory_failure_marks_order_failed() {
        let mut store = MockOrderStorePort::new();
        store.expect_save().returning(|_| Ok(()));
        store
            .expect_update()
            .withf(|order| order.status == OrderStatus::Failed && order.error_message.is_some())
            .times(1)
            .returning(|_| Ok(true));

        let mut inventory = MockInventoryGatewayPort::new();
        inventory.expect_reserve().returning(|_| {
            Err(InventoryGatewayError::Unavailable {
                message: "HTTP 503".into(),
                circuit_state: "closed".into(),
                attempts: 4,
            })
        });

        let placed = service(store, inventory).place_order(request(None)).await.unwrap();

        assert_eq!(placed.order.status, OrderStatus::Failed);
        let failure = placed.inventory_error.unwrap();
        assert!(failure.outcome_unknown);
        assert!(!failure.circuit_open);
    }

    #[tokio::test]
    async fn keyless_order_still_sends_a_stable_token() {
        let mut store = MockOrderStorePort::new();
        store.expect_save().returning(|_| Ok(()));
        store.expect_update().returning(|_| Ok(true));

        let mut inventory = MockInventoryGatewayPort::new();
        inventory
            .expect_reserve()
            .withf(|r| {
                r.idempotency_token.as_ref().map(IdempotencyToken::as_str)
                    == Some(format!("{}-inventory", r.order_id).as_str())
            })
            .times(1)
            .returning(|_| Ok(receipt(false)));

        let placed = service(store, inventory).place_order(request(None)).await.unwrap();

        assert_eq!(placed.order.status, OrderStatus::Shipped);
    }

    #[tokio::test]
    async fn late_failure_does_not_downgrade_a_shipped_order() {
        let shipped = existing(OrderStatus::Shipped);
        let failed = existing(OrderStatus::Failed);
        let order_id = failed.id;

        let mut store = MockOrderStorePort::new();
        store
            .expect_find_by_idempotency_token()
            .returning(move |_| Ok(Some(failed.clone())));
        store
            .expect_update()
            .withf(|o| o.status == OrderStatus::Failed)
            .times(1)
            .returning(|_| Ok(false));
        store.expect_get().times(1).returning(move |_| {
            let mut stored = shipped.clone();
            stored.id = order_id;
            Ok(Some(stored))
        });

        let mut inventory = MockInventoryGatewayPort::new();
        inventory.expect_reserve().returning(|_| {
            Err(InventoryGatewayError::CircuitOpen {
                service: "inventory".into(),
            })
        });

        let placed = service(store, inventory)
            .place_order(request(Some("order-1")))
            .await
            .unwrap();

        assert!(placed.replayed);
        assert_eq!(placed.order.id, order_id);
        assert!(placed.order.is_shipped());
        assert!(placed.inventory_error.is_none());
    }

    #[tokio::test]
    async fn open_circuit_is_reported() {
        let mut store = MockOrderStorePort::new();
        store.expect_save().returning(|_| Ok(()));
        store.expect_update().returning(|_| Ok(true));

        let mut inventory = MockInventoryGatewayPort::new();
        inventory.expect_reserve().returning(|_| {
            Err(InventoryGatewayError::CircuitOpen {
                service: "inventory".into(),
            })
        });

        let placed = service(store, inventory).place_order(request(None)).await.unwrap();

        let failure = placed.inventory_error.unwrap();
        assert!(failure.circuit_open);
        assert!(!failure.outcome_unknown);
    }

    #[tokio::test]
    async fn shipped_order_is_replayed_without_inventory_call() {
        let mut store = MockOrderStorePort::new();
        store
            .expect_find_by_idempotency_token()
            .returning(|_| Ok(Some(existing(OrderStatus::Shipped))));
        store.expect_save().never();
        store.expect_update().never();

        let mut inventory = MockInventoryGatewayPort::new();
        inventory.expect_reserve().never();

        let placed = service(store, inventory)
            .place_order(request(Some("order-1")))
            .await
            .unwrap();

        assert!(placed.replayed);
        assert!(placed.order.is_shipped());
    }

    #[tokio::test]
    async fn failed_order_is_resumed_with_same_token() {
        let order = existing(OrderStatus::Failed);
        let order_id = order.id;

        let mut store = MockOrderStorePort::new();
        store
            .expect_find_by_idempotency_token()
            .returning(move |_| Ok(Some(order.clone())));
        store.expect_save().never();
        store
            .expect_update()
            .withf(move |o| o.id == order_id && o.is_shipped())
            .times(1)
            .returning(|_| Ok(true));

        let mut inventory = MockInventoryGatewayPort::new();
        inventory
            .expect_reserve()
            .withf(move |r| r.order_id == order_id)
            .times(1)
            .returning(|_| Ok(receipt(true)));

        let placed = service(store, inventory)
            .place_order(request(Some("order-1")))
            .await
            .unwrap();

        assert!(!placed.replayed);
        assert_eq!(placed.order.id, order_id);
        assert!(placed.inventory_update.unwrap().replayed);
    }

    #[tokio::test]
    async fn concurrent_insert_resumes_winner() {
        let winner = existing(OrderStatus::Shipped);
        let mut lookups = 0;

        let mut store = MockOrderStorePort::new();
        store
            .expect_find_by_idempotency_token()
            .times(2)
            .returning(move |_| {
                lookups += 1;
                Ok((lookups > 1).then(|| winner.clone()))
            });
        store
            .expect_save()
            .returning(|_| Err(ApplicationError::Conflict("UNIQUE constraint failed".into())));

        let mut inventory = MockInventoryGatewayPort::new();
        inventory.expect_reserve().never();

        let placed = service(store, inventory)
            .place_order(request(Some("order-1")))
            .await
            .unwrap();

        assert!(placed.replayed);
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_storage() {
        let mut store = MockOrderStorePort::new();
        store.expect_save().never();
        let inventory = MockInventoryGatewayPort::new();

        let mut bad = request(None);
        bad.quantity = 0;

        let err = service(store, inventory).place_order(bad).await.unwrap_err();
        assert!(matches!(
            err,
            ApplicationError::Domain(DomainError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn get_order_not_found() {
        let mut store = MockOrderStorePort::new();
        store.expect_get().with(always()).returning(|_| Ok(None));

        let err = service(store, MockInventoryGatewayPort::new())
            .get_order(&OrderId::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ApplicationError::Domain(DomainError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn list_orders_passes_query() {
        let mut store = MockOrderStorePort::new();
        store
            .expect_list()
            .withf(|q| q.status == Some(OrderStatus::Shipped))
            .returning(|_| Ok(vec![existing(OrderStatus::Shipped)]));

        let orders = service(store, MockInventoryGatewayPort::new())
            .list_orders(&OrderQuery::new().with_status(OrderStatus::Shipped))
            .await
            .unwrap();

        assert_eq!(orders.len(), 1);
    }
}
