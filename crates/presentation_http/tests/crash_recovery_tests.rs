//! End-to-end crash recovery over real sockets
//!
//! The inventory service commits a stock change and then dies before
//! answering. The order service must retry with the same idempotency token
//! and receive a replay instead of a second decrement.
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::{sync::Arc, time::Duration};

use application::StockMutator;
use axum::http::StatusCode;
use axum_test::TestServer;
use domain::ProductKey;
use infrastructure::{
    AsyncDatabase, CircuitBreakerConfig, CrashMode, CrashPolicy, FaultInjector,
    InventoryClientConfig, LatencyPolicy, ResilientInventoryClient, RetryConfig,
    SqliteOrderStore, SqliteStockLedger, TriggerPattern,
};
use presentation_http::{InventoryState, OrderState, create_inventory_router, create_order_router};
use serde_json::{Value, json};
use tokio::net::TcpListener;

async fn spawn_inventory(mode: CrashMode, frequency: u64) -> (String, InventoryState) {
    let database = AsyncDatabase::in_memory().await.unwrap();
    database.migrate().await.unwrap();
    let ledger = Arc::new(SqliteStockLedger::new(database.pool().clone()));
    let injector = FaultInjector::new(
        LatencyPolicy::default(),
        CrashPolicy {
            enabled: true,
            frequency,
            pattern: TriggerPattern::Deterministic,
            mode,
            ..CrashPolicy::default()
        },
    );
    let state = InventoryState::new(StockMutator::new(ledger), injector);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_inventory_router(state.clone());
    tokio::spawn(async move { axum::serve(listener, app).await });
    (format!("http://{addr}"), state)
}

async fn order_server(base_url: String, timeout: Duration, max_retries: u32) -> TestServer {
    let database = AsyncDatabase::in_memory().await.unwrap();
    database.migrate().await.unwrap();
    let store = Arc::new(SqliteOrderStore::new(database.pool().clone()));
    let client = ResilientInventoryClient::new(InventoryClientConfig {
        base_url,
        request_timeout: timeout,
        retry: RetryConfig::new(10, max_retries),
        circuit_breaker: CircuitBreakerConfig {
            volume_threshold: 5,
            ..CircuitBreakerConfig::default()
        },
    })
    .unwrap();
    TestServer::new(create_order_router(OrderState::new(store, Arc::new(client))))
        .expect("Failed to create test server")
}

async fn stock(state: &InventoryState, key: &str) -> i64 {
    state
        .mutator
        .get_item(&ProductKey::new(key).unwrap())
        .await
        .unwrap()
        .quantity
}

/// Consume the first crash ticket so the next counted request crashes
async fn burn_first_ticket(base_url: &str) {
    let response = reqwest::Client::new()
        .post(format!("{base_url}/api/inventory/update"))
        .json(&json!({ "product_key": "SKU-3", "quantity": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn aborted_connection_after_commit_is_replayed_on_retry() {
    let (base_url, inventory) = spawn_inventory(CrashMode::ConnectionAbort, 2).await;
    burn_first_ticket(&base_url).await;
    let server = order_server(base_url, Duration::from_secs(2), 3).await;

    let response = server
        .post("/api/orders")
        .json(&json!({
            "customer_id": "cust-1",
            "product_key": "SKU-1",
            "product_name": "Mechanical Keyboard",
            "quantity": 3,
            "idempotency_key": "crash-order-1"
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["order"]["status"], "shipped");
    assert_eq!(body["inventory_update"]["replayed"], true);
    assert_eq!(body["inventory_update"]["quantity_after"], 7);
    assert_eq!(stock(&inventory, "SKU-1").await, 7);

    let crash_stats = inventory.injector.crash_stats();
    assert_eq!(crash_stats.activations, 1);
}

#[tokio::test]
async fn error_substitution_after_commit_is_replayed_on_retry() {
    let (base_url, inventory) = spawn_inventory(CrashMode::ErrorSubstitution, 2).await;
    burn_first_ticket(&base_url).await;
    let server = order_server(base_url, Duration::from_secs(2), 3).await;

    let body: Value = server
        .post("/api/orders")
        .json(&json!({
            "customer_id": "cust-1",
            "product_key": "SKU-2",
            "product_name": "Wireless Mouse",
            "quantity": 5
        }))
        .await
        .json();

    assert_eq!(body["order"]["status"], "shipped");
    assert_eq!(body["inventory_update"]["replayed"], true);
    assert_eq!(stock(&inventory, "SKU-2").await, 20);
}

#[tokio::test]
async fn hang_without_retries_leaves_outcome_unknown() {
    let (base_url, inventory) = spawn_inventory(CrashMode::Hang, 2).await;
    burn_first_ticket(&base_url).await;
    let server = order_server(base_url, Duration::from_millis(300), 0).await;

    let body: Value = server
        .post("/api/orders")
        .json(&json!({
            "customer_id": "cust-1",
            "product_key": "SKU-1",
            "product_name": "Mechanical Keyboard",
            "quantity": 2
        }))
        .await
        .json();

    assert_eq!(body["order"]["status"], "failed");
    assert_eq!(body["outcome_unknown"], true);
    // The commit happened before the hang
    assert_eq!(stock(&inventory, "SKU-1").await, 8);
}

#[tokio::test]
async fn resuming_an_unknown_order_completes_it_without_double_decrement() {
    let (base_url, inventory) = spawn_inventory(CrashMode::Hang, 2).await;
    burn_first_ticket(&base_url).await;
    let server = order_server(base_url, Duration::from_millis(300), 0).await;
    let request = json!({
        "customer_id": "cust-1",
        "product_key": "SKU-1",
        "product_name": "Mechanical Keyboard",
        "quantity": 2,
        "idempotency_key": "resume-me"
    });

    let first: Value = server.post("/api/orders").json(&request).await.json();
    assert_eq!(first["outcome_unknown"], true);

    let resumed = server.post("/api/orders").json(&request).await;
    assert_eq!(resumed.status_code(), StatusCode::CREATED);
    let body: Value = resumed.json();
    assert_eq!(body["order"]["status"], "shipped");
    assert_eq!(body["order"]["id"], first["order"]["id"]);
    assert_eq!(body["inventory_update"]["replayed"], true);
    assert_eq!(stock(&inventory, "SKU-1").await, 8);
}
