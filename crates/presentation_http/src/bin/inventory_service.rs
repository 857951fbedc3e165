//! Inventory service
//!
//! Owns stock levels and the idempotency ledger, with configurable latency
//! and crash injection on its mutating endpoints.

use std::sync::Arc;

use application::StockMutator;
use infrastructure::SqliteStockLedger;
use presentation_http::{
    create_inventory_router,
    handlers::health::INVENTORY_SERVICE,
    server::{self, INVENTORY_PORT},
    state::InventoryState,
};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = server::bootstrap(INVENTORY_SERVICE)?;
    info!(version = env!("CARGO_PKG_VERSION"), "Starting {INVENTORY_SERVICE}");

    let database = server::open_database(&config.database).await?;
    let ledger = Arc::new(SqliteStockLedger::new(database.pool().clone()));
    let mutator = StockMutator::new(ledger)
        .with_max_conflict_retries(config.stock_mutator.max_conflict_retries);

    info!(
        latency_enabled = config.chaos.latency.enabled,
        crash_enabled = config.chaos.crash.enabled,
        crash_mode = ?config.chaos.crash.mode,
        "Fault injection configured"
    );
    let state = InventoryState::new(mutator, config.chaos.injector());

    server::serve(create_inventory_router(state), &config.server, INVENTORY_PORT).await?;
    database.close().await;
    Ok(())
}
