//! Order service
//!
//! Places orders and removes their stock through the resilient inventory
//! client.

use std::sync::Arc;

use infrastructure::{ResilientInventoryClient, SqliteOrderStore};
use presentation_http::{
    create_order_router,
    handlers::health::ORDER_SERVICE,
    server::{self, ORDER_PORT},
    state::OrderState,
};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = server::bootstrap(ORDER_SERVICE)?;
    info!(version = env!("CARGO_PKG_VERSION"), "Starting {ORDER_SERVICE}");

    let database = server::open_database(&config.database).await?;
    let store = Arc::new(SqliteOrderStore::new(database.pool().clone()));

    let client_config = config.resilience.inventory_client_config();
    info!(
        inventory_url = %client_config.base_url,
        max_retries = client_config.retry.max_retries,
        "Inventory client configured"
    );
    let inventory = Arc::new(ResilientInventoryClient::new(client_config)?);
    let state = OrderState::new(store, inventory);

    server::serve(create_order_router(state), &config.server, ORDER_PORT).await?;
    database.close().await;
    Ok(())
}
