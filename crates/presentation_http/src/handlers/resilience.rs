//! Resilience statistics handler

use axum::{Json, extract::State};
use infrastructure::ResilienceStats;

use crate::state::OrderState;

/// Breaker state, statistics and configuration of the inventory client
pub async fn resilience_stats(State(state): State<OrderState>) -> Json<ResilienceStats> {
    Json(state.inventory.stats())
}
