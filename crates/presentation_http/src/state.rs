//! Application state shared across handlers

use std::sync::Arc;

use application::{InventoryGatewayPort, OrderService, OrderStorePort, StockMutator};
use infrastructure::{FaultInjector, ResilientInventoryClient};

use crate::handlers::metrics::MetricsCollector;

/// Shared state of the inventory service
#[derive(Clone)]
pub struct InventoryState {
    /// Idempotent stock mutation path
    pub mutator: Arc<StockMutator>,
    /// Latency and crash policies applied to mutating requests
    pub injector: Arc<FaultInjector>,
    /// Request and chaos counters
    pub metrics: Arc<MetricsCollector>,
}

impl InventoryState {
    /// Create inventory state with fresh metrics
    pub fn new(mutator: StockMutator, injector: FaultInjector) -> Self {
        Self {
            mutator: Arc::new(mutator),
            injector: Arc::new(injector),
            metrics: Arc::new(MetricsCollector::new()),
        }
    }
}

impl std::fmt::Debug for InventoryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InventoryState")
            .field("injector", &self.injector)
            .finish_non_exhaustive()
    }
}

/// Shared state of the order service
#[derive(Clone)]
pub struct OrderState {
    /// Order placement use case
    pub orders: Arc<OrderService>,
    /// Resilient client the order service calls inventory through
    pub inventory: Arc<ResilientInventoryClient>,
    /// Request and order counters
    pub metrics: Arc<MetricsCollector>,
}

impl OrderState {
    /// Create order state whose service calls inventory through `inventory`
    pub fn new(store: Arc<dyn OrderStorePort>, inventory: Arc<ResilientInventoryClient>) -> Self {
        let gateway: Arc<dyn InventoryGatewayPort> = Arc::clone(&inventory) as _;
        Self {
            orders: Arc::new(OrderService::new(store, gateway)),
            inventory,
            metrics: Arc::new(MetricsCollector::new()),
        }
    }
}

impl std::fmt::Debug for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderState")
            .field("inventory", &self.inventory)
            .finish_non_exhaustive()
    }
}
