//! Metrics collection and the Prometheus text endpoint
//!
//! Counters are plain atomics owned by [`MetricsCollector`]; the endpoint
//! renders them on demand.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Instant,
};

use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
};
use infrastructure::CircuitState;
use serde::Serialize;

use crate::state::{InventoryState, OrderState};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Result label for `inventory_updates_total`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventoryUpdateResult {
    Applied,
    Replayed,
    Insufficient,
    NotFound,
    Rejected,
}

impl InventoryUpdateResult {
    const ALL: [Self; 5] = [
        Self::Applied,
        Self::Replayed,
        Self::Insufficient,
        Self::NotFound,
        Self::Rejected,
    ];

    pub const fn as_label(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Replayed => "replayed",
            Self::Insufficient => "insufficient",
            Self::NotFound => "not_found",
            Self::Rejected => "rejected",
        }
    }
}

/// Status label for `orders_total`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderOutcome {
    Shipped,
    Failed,
    Replayed,
}

impl OrderOutcome {
    const ALL: [Self; 3] = [Self::Shipped, Self::Failed, Self::Replayed];

    pub const fn as_label(self) -> &'static str {
        match self {
            Self::Shipped => "shipped",
            Self::Failed => "failed",
            Self::Replayed => "replayed",
        }
    }
}

/// Request metrics snapshot
#[derive(Debug, Clone, Serialize)]
pub struct RequestMetrics {
    pub total_requests: u64,
    pub success_count: u64,
    pub client_error_count: u64,
    pub server_error_count: u64,
    pub avg_response_time_ms: f64,
    pub active_requests: u64,
}

/// Thread-safe metrics collector
#[derive(Debug)]
pub struct MetricsCollector {
    start_time: Instant,
    total_requests: AtomicU64,
    success_count: AtomicU64,
    client_error_count: AtomicU64,
    server_error_count: AtomicU64,
    total_response_time_us: AtomicU64,
    active_requests: AtomicU64,
    inventory_updates: [AtomicU64; 5],
    gremlin_activations: AtomicU64,
    crash_simulations: AtomicU64,
    orders: [AtomicU64; 3],
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    /// Create a new metrics collector
    #[must_use]
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            total_requests: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            client_error_count: AtomicU64::new(0),
            server_error_count: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
            active_requests: AtomicU64::new(0),
            inventory_updates: Default::default(),
            gremlin_activations: AtomicU64::new(0),
            crash_simulations: AtomicU64::new(0),
            orders: Default::default(),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Record request start
    pub fn request_start(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.active_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record request completion
    pub fn request_end(&self, response_time_us: u64, status_code: u16) {
        self.active_requests.fetch_sub(1, Ordering::Relaxed);
        self.total_response_time_us
            .fetch_add(response_time_us, Ordering::Relaxed);

        match status_code {
            200..=299 => self.success_count.fetch_add(1, Ordering::Relaxed),
            400..=499 => self.client_error_count.fetch_add(1, Ordering::Relaxed),
            500..=599 => self.server_error_count.fetch_add(1, Ordering::Relaxed),
            _ => 0,
        };
    }

    /// Record a request that was dropped before producing a response
    pub fn request_abandoned(&self) {
        self.active_requests.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record the result of a stock update request
    pub fn record_inventory_update(&self, result: InventoryUpdateResult) {
        self.inventory_updates[result as usize].fetch_add(1, Ordering::Relaxed);
    }

    /// Record a latency gremlin activation
    pub fn record_gremlin_activation(&self) {
        self.gremlin_activations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a simulated crash
    pub fn record_crash_simulation(&self) {
        self.crash_simulations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record how an order placement ended
    pub fn record_order(&self, outcome: OrderOutcome) {
        self.orders[outcome as usize].fetch_add(1, Ordering::Relaxed);
    }

    /// Count of stock update requests with the given result
    pub fn inventory_updates(&self, result: InventoryUpdateResult) -> u64 {
        self.inventory_updates[result as usize].load(Ordering::Relaxed)
    }

    /// Count of placed orders with the given outcome
    pub fn orders(&self, outcome: OrderOutcome) -> u64 {
        self.orders[outcome as usize].load(Ordering::Relaxed)
    }

    /// Count of latency gremlin activations
    pub fn gremlin_activations(&self) -> u64 {
        self.gremlin_activations.load(Ordering::Relaxed)
    }

    /// Count of simulated crashes
    pub fn crash_simulations(&self) -> u64 {
        self.crash_simulations.load(Ordering::Relaxed)
    }

    /// Get request metrics
    #[must_use]
    pub fn request_metrics(&self) -> RequestMetrics {
        let total = self.total_requests.load(Ordering::Relaxed);
        let total_time = self.total_response_time_us.load(Ordering::Relaxed);

        RequestMetrics {
            total_requests: total,
            success_count: self.success_count.load(Ordering::Relaxed),
            client_error_count: self.client_error_count.load(Ordering::Relaxed),
            server_error_count: self.server_error_count.load(Ordering::Relaxed),
            #[allow(clippy::cast_precision_loss)]
            avg_response_time_ms: if total > 0 {
                (total_time as f64) / (total as f64) / 1000.0
            } else {
                0.0
            },
            active_requests: self.active_requests.load(Ordering::Relaxed),
        }
    }

    /// Render the HTTP and uptime counters shared by both services
    fn render_common(&self, output: &mut String) {
        let request_metrics = self.request_metrics();

        output.push_str(&format!(
            "# HELP app_uptime_seconds Application uptime in seconds\n\
             # TYPE app_uptime_seconds counter\n\
             app_uptime_seconds {}\n\n",
            self.uptime_seconds()
        ));

        output.push_str(&format!(
            "# HELP http_requests_total Total HTTP requests\n\
             # TYPE http_requests_total counter\n\
             http_requests_total {}\n\n",
            request_metrics.total_requests
        ));

        output.push_str(&format!(
            "# HELP http_requests_success_total Successful HTTP requests\n\
             # TYPE http_requests_success_total counter\n\
             http_requests_success_total {}\n\n",
            request_metrics.success_count
        ));

        output.push_str(&format!(
            "# HELP http_requests_client_error_total Client error HTTP requests\n\
             # TYPE http_requests_client_error_total counter\n\
             http_requests_client_error_total {}\n\n",
            request_metrics.client_error_count
        ));

        output.push_str(&format!(
            "# HELP http_requests_server_error_total Server error HTTP requests\n\
             # TYPE http_requests_server_error_total counter\n\
             http_requests_server_error_total {}\n\n",
            request_metrics.server_error_count
        ));

        output.push_str(&format!(
            "# HELP http_requests_active Current active HTTP requests\n\
             # TYPE http_requests_active gauge\n\
             http_requests_active {}\n\n",
            request_metrics.active_requests
        ));

        output.push_str(&format!(
            "# HELP http_response_time_avg_ms Average response time in milliseconds\n\
             # TYPE http_response_time_avg_ms gauge\n\
             http_response_time_avg_ms {:.2}\n\n",
            request_metrics.avg_response_time_ms
        ));
    }

    /// Render the inventory service exposition
    pub fn render_inventory(&self) -> String {
        let mut output = String::new();
        self.render_common(&mut output);

        output.push_str(
            "# HELP inventory_updates_total Stock update requests by result\n\
             # TYPE inventory_updates_total counter\n",
        );
        for result in InventoryUpdateResult::ALL {
            output.push_str(&format!(
                "inventory_updates_total{{result=\"{}\"}} {}\n",
                result.as_label(),
                self.inventory_updates(result)
            ));
        }
        output.push('\n');

        output.push_str(&format!(
            "# HELP gremlin_activations_total Requests delayed by the latency gremlin\n\
             # TYPE gremlin_activations_total counter\n\
             gremlin_activations_total {}\n\n",
            self.gremlin_activations()
        ));

        output.push_str(&format!(
            "# HELP crash_simulations_total Responses sabotaged after commit\n\
             # TYPE crash_simulations_total counter\n\
             crash_simulations_total {}\n",
            self.crash_simulations()
        ));

        output
    }

    /// Render the order service exposition
    pub fn render_orders(&self, circuit: CircuitState) -> String {
        let mut output = String::new();
        self.render_common(&mut output);

        output.push_str(
            "# HELP orders_total Order placements by outcome\n\
             # TYPE orders_total counter\n",
        );
        for outcome in OrderOutcome::ALL {
            output.push_str(&format!(
                "orders_total{{status=\"{}\"}} {}\n",
                outcome.as_label(),
                self.orders(outcome)
            ));
        }
        output.push('\n');

        output.push_str(&format!(
            "# HELP circuit_breaker_state Inventory breaker state (0 closed, 1 open, 2 half-open)\n\
             # TYPE circuit_breaker_state gauge\n\
             circuit_breaker_state{{breaker=\"inventory\"}} {}\n",
            circuit.as_gauge()
        ));

        output
    }
}

/// Prometheus metrics of the inventory service
pub async fn inventory_metrics(State(state): State<InventoryState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        state.metrics.render_inventory(),
    )
}

/// Prometheus metrics of the order service
pub async fn order_metrics(State(state): State<OrderState>) -> impl IntoResponse {
    let circuit = state.inventory.breaker().state();
    (
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        state.metrics.render_orders(circuit),
    )
}
