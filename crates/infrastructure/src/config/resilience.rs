//! Resilience configuration for the order service's inventory client.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    adapters::{CircuitBreakerConfig, InventoryClientConfig},
    retry::RetryConfig,
};

/// Circuit breaker settings in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerAppConfig {
    /// Upper bound for one logical call including retries (default: 30000ms)
    #[serde(default = "default_call_timeout")]
    pub call_timeout_ms: u64,

    /// Failure percentage that opens the circuit (default: 50)
    #[serde(default = "default_error_threshold")]
    pub error_threshold_percentage: u8,

    /// Time spent open before a trial call (default: 10000ms)
    #[serde(default = "default_reset_timeout")]
    pub reset_timeout_ms: u64,

    /// Rolling statistics window (default: 10000ms)
    #[serde(default = "default_rolling_window")]
    pub rolling_window_ms: u64,

    /// Minimum calls in the window before the threshold applies (default: 0)
    #[serde(default)]
    pub volume_threshold: u32,
}

const fn default_call_timeout() -> u64 {
    30_000
}

const fn default_error_threshold() -> u8 {
    50
}

const fn default_reset_timeout() -> u64 {
    10_000
}

const fn default_rolling_window() -> u64 {
    10_000
}

impl Default for CircuitBreakerAppConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: default_call_timeout(),
            error_threshold_percentage: default_error_threshold(),
            reset_timeout_ms: default_reset_timeout(),
            rolling_window_ms: default_rolling_window(),
            volume_threshold: 0,
        }
    }
}

impl From<&CircuitBreakerAppConfig> for CircuitBreakerConfig {
    fn from(config: &CircuitBreakerAppConfig) -> Self {
        Self {
            call_timeout: Duration::from_millis(config.call_timeout_ms),
            error_threshold_percentage: config.error_threshold_percentage,
            reset_timeout: Duration::from_millis(config.reset_timeout_ms),
            rolling_window: Duration::from_millis(config.rolling_window_ms),
            volume_threshold: config.volume_threshold,
        }
    }
}

/// Settings for calls from the order service to the inventory service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResilienceAppConfig {
    /// Base URL of the inventory service
    #[serde(default = "default_inventory_url")]
    pub inventory_url: String,

    /// Timeout for a single attempt (default: 5000ms)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Retries after the first attempt (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry, doubled for each further one (default: 1000ms)
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerAppConfig,
}

fn default_inventory_url() -> String {
    "http://localhost:3002".to_string()
}

const fn default_request_timeout() -> u64 {
    5000
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_backoff_base() -> u64 {
    1000
}

impl Default for ResilienceAppConfig {
    fn default() -> Self {
        Self {
            inventory_url: default_inventory_url(),
            request_timeout_ms: default_request_timeout(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base(),
            circuit_breaker: CircuitBreakerAppConfig::default(),
        }
    }
}

impl ResilienceAppConfig {
    /// Build the inventory client configuration
    pub fn inventory_client_config(&self) -> InventoryClientConfig {
        InventoryClientConfig {
            base_url: self.inventory_url.clone(),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            retry: RetryConfig::new(self.backoff_base_ms, self.max_retries),
            circuit_breaker: CircuitBreakerConfig::from(&self.circuit_breaker),
        }
    }
}

/// Stock mutator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMutatorAppConfig {
    /// Restarts allowed after a token race or a busy database (default: 3)
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,
}

const fn default_max_conflict_retries() -> u32 {
    3
}

impl Default for StockMutatorAppConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: default_max_conflict_retries(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_config_carries_every_setting() {
        let config = ResilienceAppConfig {
            inventory_url: "http://inventory:9000".into(),
            request_timeout_ms: 250,
            max_retries: 5,
            backoff_base_ms: 40,
            circuit_breaker: CircuitBreakerAppConfig {
                volume_threshold: 4,
                ..CircuitBreakerAppConfig::default()
            },
        };
        let client = config.inventory_client_config();
        assert_eq!(client.base_url, "http://inventory:9000");
        assert_eq!(client.request_timeout, Duration::from_millis(250));
        assert_eq!(client.retry.max_retries, 5);
        assert_eq!(client.retry.base_delay_ms, 40);
        assert!(!client.retry.jitter_enabled);
        assert_eq!(client.circuit_breaker.volume_threshold, 4);
        assert_eq!(client.circuit_breaker.reset_timeout, Duration::from_secs(10));
    }
}
