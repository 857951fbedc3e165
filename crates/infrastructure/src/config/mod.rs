//! Application configuration
//!
//! Split into focused sub-modules:
//! - `server`: HTTP server and logging settings
//! - `database`: SQLite database settings
//! - `resilience`: inventory client retry and circuit breaker, stock mutator
//!
//! Fault injection reuses the chaos policies directly as its config section.

mod database;
mod resilience;
mod server;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub use database::DatabaseConfig;
pub use resilience::{CircuitBreakerAppConfig, ResilienceAppConfig, StockMutatorAppConfig};
pub use server::{LogFormat, LoggingConfig, ServerConfig};

use crate::chaos::{CrashPolicy, FaultInjector, LatencyPolicy};

/// Prefix for environment overrides, e.g. `STOCKGUARD_RESILIENCE__MAX_RETRIES`
pub const ENV_PREFIX: &str = "STOCKGUARD";

/// Shared default for boolean `true` fields across config structs
pub(crate) const fn default_true() -> bool {
    true
}

/// Fault injection settings for the inventory service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChaosAppConfig {
    #[serde(default)]
    pub latency: LatencyPolicy,

    #[serde(default)]
    pub crash: CrashPolicy,
}

impl ChaosAppConfig {
    /// Build the fault injector for these policies
    pub fn injector(&self) -> FaultInjector {
        FaultInjector::new(self.latency.clone(), self.crash.clone())
    }
}

/// A configuration value outside its allowed range
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigValidationError {
    #[error("{field} must not be zero")]
    Zero { field: &'static str },

    #[error("{field} must be between 0 and 1, got {value}")]
    ProbabilityOutOfRange { field: &'static str, value: f64 },

    #[error("{field} must be between 1 and 100, got {value}")]
    ThresholdOutOfRange { field: &'static str, value: u8 },

    #[error("{field} is invalid: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    /// Inventory client settings (order service)
    #[serde(default)]
    pub resilience: ResilienceAppConfig,

    /// Fault injection (inventory service)
    #[serde(default)]
    pub chaos: ChaosAppConfig,

    #[serde(default)]
    pub stock_mutator: StockMutatorAppConfig,
}

impl AppConfig {
    /// Load configuration from the optional `config` file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::from_sources(
            config::File::with_name("config").required(false),
            config::Environment::with_prefix(ENV_PREFIX),
        )
    }

    /// Build configuration from a file source overridden by an environment source
    pub fn from_sources<F>(file: F, env: config::Environment) -> Result<Self, config::ConfigError>
    where
        F: config::Source + Send + Sync + 'static,
    {
        let config = config::Config::builder()
            .add_source(file)
            .add_source(
                env.prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("server.allowed_origins"),
            )
            .build()?;
        let loaded: Self = config.try_deserialize()?;
        debug!("Configuration loaded");
        Ok(loaded)
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        let resilience = &self.resilience;
        let breaker = &resilience.circuit_breaker;
        let latency = &self.chaos.latency;
        let crash = &self.chaos.crash;

        non_zero("resilience.request_timeout_ms", resilience.request_timeout_ms)?;
        non_zero("resilience.circuit_breaker.call_timeout_ms", breaker.call_timeout_ms)?;
        non_zero("resilience.circuit_breaker.reset_timeout_ms", breaker.reset_timeout_ms)?;
        non_zero(
            "resilience.circuit_breaker.rolling_window_ms",
            breaker.rolling_window_ms,
        )?;
        if !(1..=100).contains(&breaker.error_threshold_percentage) {
            return Err(ConfigValidationError::ThresholdOutOfRange {
                field: "resilience.circuit_breaker.error_threshold_percentage",
                value: breaker.error_threshold_percentage,
            });
        }
        if let Err(reason) = reqwest::Url::parse(&resilience.inventory_url) {
            return Err(ConfigValidationError::Invalid {
                field: "resilience.inventory_url",
                reason: reason.to_string(),
            });
        }

        non_zero("chaos.latency.frequency", latency.frequency)?;
        non_zero("chaos.crash.frequency", crash.frequency)?;
        if !(0.0..=1.0).contains(&crash.probability) {
            return Err(ConfigValidationError::ProbabilityOutOfRange {
                field: "chaos.crash.probability",
                value: crash.probability,
            });
        }

        non_zero("database.max_connections", u64::from(self.database.max_connections))?;
        non_zero("database.busy_timeout_ms", self.database.busy_timeout_ms)?;
        Ok(())
    }
}

fn non_zero(field: &'static str, value: u64) -> Result<(), ConfigValidationError> {
    if value == 0 {
        Err(ConfigValidationError::Zero { field })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use config::FileFormat;

    use super::*;
    use crate::chaos::{CrashMode, TriggerPattern};

    fn load(toml: &str, env: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = env
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        AppConfig::from_sources(
            config::File::from_str(toml, FileFormat::Toml),
            config::Environment::with_prefix(ENV_PREFIX).source(Some(vars)),
        )
        .unwrap()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = load("", &[]);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, None);
        assert_eq!(config.database.path, "stockguard.db");
        assert_eq!(config.resilience.request_timeout_ms, 5000);
        assert_eq!(config.resilience.max_retries, 3);
        assert_eq!(config.resilience.backoff_base_ms, 1000);
        assert_eq!(config.resilience.circuit_breaker.error_threshold_percentage, 50);
        assert_eq!(config.resilience.circuit_breaker.volume_threshold, 0);
        assert!(!config.chaos.latency.enabled);
        assert_eq!(config.chaos.latency.latency_ms, 3000);
        assert_eq!(config.chaos.crash.pattern, TriggerPattern::Random);
        assert_eq!(config.stock_mutator.max_conflict_retries, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn file_values_apply() {
        let config = load(
            r#"
            [chaos.crash]
            enabled = true
            mode = "internal_error"
            pattern = "deterministic"
            frequency = 3

            [server]
            log_format = "json"
            "#,
            &[],
        );
        assert!(config.chaos.crash.enabled);
        assert_eq!(config.chaos.crash.mode, CrashMode::ErrorSubstitution);
        assert_eq!(config.chaos.crash.frequency, 3);
        assert_eq!(config.server.log_format, LogFormat::Json);
    }

    #[test]
    fn environment_overrides_file() {
        let config = load(
            "[resilience]\nmax_retries = 1\n",
            &[
                ("STOCKGUARD_RESILIENCE__MAX_RETRIES", "5"),
                ("STOCKGUARD_CHAOS__LATENCY__ENABLED", "true"),
                ("STOCKGUARD_SERVER__PORT", "4000"),
            ],
        );
        assert_eq!(config.resilience.max_retries, 5);
        assert!(config.chaos.latency.enabled);
        assert_eq!(config.server.bind_address(3002), "0.0.0.0:4000");
    }

    #[test]
    fn bind_address_falls_back_to_binary_default() {
        assert_eq!(ServerConfig::default().bind_address(3001), "0.0.0.0:3001");
    }

    #[test]
    fn zero_frequency_is_rejected() {
        let mut config = AppConfig::default();
        config.chaos.latency.frequency = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigValidationError::Zero {
                field: "chaos.latency.frequency"
            })
        );
    }

    #[test]
    fn probability_must_be_a_fraction() {
        let mut config = AppConfig::default();
        config.chaos.crash.probability = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::ProbabilityOutOfRange { .. })
        ));
    }

    #[test]
    fn threshold_must_be_a_percentage() {
        let mut config = AppConfig::default();
        config.resilience.circuit_breaker.error_threshold_percentage = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::ThresholdOutOfRange { value: 0, .. })
        ));
        config.resilience.circuit_breaker.error_threshold_percentage = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut config = AppConfig::default();
        config.resilience.request_timeout_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::Zero { .. })
        ));
    }

    #[test]
    fn chaos_config_builds_injector() {
        let mut chaos = ChaosAppConfig::default();
        chaos.latency.enabled = true;
        let injector = chaos.injector();
        assert!(injector.latency_stats().enabled);
        assert!(!injector.crash_stats().enabled);
    }
}
