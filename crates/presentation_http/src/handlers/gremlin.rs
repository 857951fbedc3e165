//! Fault injection admin handlers

use axum::{Json, extract::State};
use infrastructure::chaos::{CrashStats, LatencyStats};
use serde::Serialize;
use tracing::info;

use crate::state::InventoryState;

/// Reset confirmation with the fresh statistics
#[derive(Debug, Serialize)]
pub struct ResetResponse<T> {
    pub message: &'static str,
    pub stats: T,
}

/// Latency policy statistics
pub async fn latency_stats(State(state): State<InventoryState>) -> Json<LatencyStats> {
    Json(state.injector.latency_stats())
}

/// Reset the latency policy counters
pub async fn reset_latency(
    State(state): State<InventoryState>,
) -> Json<ResetResponse<LatencyStats>> {
    let stats = state.injector.reset_latency();
    info!("Latency gremlin counters reset");
    Json(ResetResponse {
        message: "Latency gremlin counters reset",
        stats,
    })
}

/// Crash policy statistics
pub async fn crash_stats(State(state): State<InventoryState>) -> Json<CrashStats> {
    Json(state.injector.crash_stats())
}

/// Reset the crash policy counters
pub async fn reset_crash(State(state): State<InventoryState>) -> Json<ResetResponse<CrashStats>> {
    let stats = state.injector.reset_crash();
    info!("Crash simulator counters reset");
    Json(ResetResponse {
        message: "Crash simulator counters reset",
        stats,
    })
}
