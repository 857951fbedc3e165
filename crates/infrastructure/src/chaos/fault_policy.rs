//! Fault policy definitions for chaos engineering.
//!
//! Two independent policies exist. The latency policy delays requests before
//! they reach the handler. The crash policy sabotages the response after the
//! handler has committed its work.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// How a policy decides whether to fire for a request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerPattern {
    /// Fire on every `frequency`-th counted request
    #[default]
    Deterministic,
    /// Fire at random
    Random,
}

/// How a simulated crash manifests to the client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrashMode {
    /// Drop the connection without writing a response
    #[default]
    #[serde(alias = "connection_reset")]
    ConnectionAbort,
    /// Replace the successful response with a 500
    #[serde(alias = "internal_error")]
    ErrorSubstitution,
    /// Never respond
    #[serde(alias = "timeout")]
    Hang,
}

/// Latency injection policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyPolicy {
    pub enabled: bool,
    /// Delay applied when the policy fires
    pub latency_ms: u64,
    /// Deterministic: every n-th request. Random: probability 1/n.
    pub frequency: u64,
    pub pattern: TriggerPattern,
}

impl Default for LatencyPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            latency_ms: 3000,
            frequency: 5,
            pattern: TriggerPattern::Deterministic,
        }
    }
}

impl LatencyPolicy {
    /// Delay applied when the policy fires
    pub const fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }

    /// Decide for the `count`-th request given a uniform roll in `[0, 1)`
    #[allow(clippy::cast_precision_loss)]
    pub fn fires(&self, count: u64, roll: f64) -> bool {
        if self.frequency == 0 {
            return false;
        }
        match self.pattern {
            TriggerPattern::Deterministic => count % self.frequency == 0,
            TriggerPattern::Random => roll < 1.0 / self.frequency as f64,
        }
    }

    /// Decide for the `count`-th request
    pub fn triggers(&self, count: u64) -> bool {
        self.fires(count, rand::rng().random::<f64>())
    }
}

/// Crash simulation policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrashPolicy {
    pub enabled: bool,
    /// Random pattern: chance of crashing a successful request
    pub probability: f64,
    /// Deterministic pattern: crash every n-th request
    pub frequency: u64,
    pub pattern: TriggerPattern,
    pub mode: CrashMode,
}

impl Default for CrashPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            probability: 0.1,
            frequency: 10,
            pattern: TriggerPattern::Random,
            mode: CrashMode::ConnectionAbort,
        }
    }
}

impl CrashPolicy {
    /// Decide for the `count`-th request given a uniform roll in `[0, 1)`
    pub fn fires(&self, count: u64, roll: f64) -> bool {
        match self.pattern {
            TriggerPattern::Deterministic => self.frequency != 0 && count % self.frequency == 0,
            TriggerPattern::Random => roll < self.probability,
        }
    }

    /// Decide for the `count`-th request
    pub fn triggers(&self, count: u64) -> bool {
        self.fires(count, rand::rng().random::<f64>())
    }
}
