//! Fault injector combining the latency and crash policies.
//!
//! The injector only decides. Applying a delay or sabotaging a response is
//! left to the HTTP layer that owns the request.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use super::{ChaosContext, CrashMode, CrashPolicy, LatencyPolicy, TriggerPattern};

/// Claim on a crash decision, taken when a request arrives
///
/// The number is fixed at arrival so that concurrent requests finishing in
/// a different order cannot trade places in the deterministic sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrashTicket {
    request_number: u64,
    generation: u64,
}

impl CrashTicket {
    /// Position of the request in the crash policy's sequence
    pub const fn request_number(self) -> u64 {
        self.request_number
    }
}

/// Latency policy statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LatencyStats {
    pub enabled: bool,
    pub total_requests: u64,
    pub activations: u64,
    pub latency_ms: u64,
    pub frequency: u64,
    pub pattern: TriggerPattern,
}

/// Crash policy statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrashStats {
    pub enabled: bool,
    pub total_requests: u64,
    pub activations: u64,
    pub probability: f64,
    pub frequency: u64,
    pub pattern: TriggerPattern,
    pub mode: CrashMode,
}

/// Fault injector for simulating slow and crashing requests
#[derive(Debug, Default)]
pub struct FaultInjector {
    latency: LatencyPolicy,
    crash: CrashPolicy,
    latency_counters: ChaosContext,
    crash_counters: ChaosContext,
}

impl FaultInjector {
    /// Create a new fault injector with the given policies
    pub fn new(latency: LatencyPolicy, crash: CrashPolicy) -> Self {
        Self {
            latency,
            crash,
            latency_counters: ChaosContext::new(),
            crash_counters: ChaosContext::new(),
        }
    }

    /// Create a fault injector that never fires
    pub fn disabled() -> Self {
        Self::default()
    }

    /// The latency policy
    pub const fn latency_policy(&self) -> &LatencyPolicy {
        &self.latency
    }

    /// The crash policy
    pub const fn crash_policy(&self) -> &CrashPolicy {
        &self.crash
    }

    /// Count an arriving request against the latency policy
    ///
    /// Returns the delay to apply, if the policy fires.
    pub fn latency_decision(&self) -> Option<Duration> {
        if !self.latency.enabled {
            return None;
        }
        let (request_number, fired) = self
            .latency_counters
            .tick_and_decide(|count| self.latency.triggers(count));
        if !fired {
            return None;
        }
        warn!(
            request_number,
            latency_ms = self.latency.latency_ms,
            "Latency gremlin delaying request"
        );
        Some(self.latency.latency())
    }

    /// Count an arriving request against the crash policy
    pub fn crash_ticket(&self) -> Option<CrashTicket> {
        if !self.crash.enabled {
            return None;
        }
        let (request_number, generation) = self.crash_counters.tick_with_generation();
        Some(CrashTicket {
            request_number,
            generation,
        })
    }

    /// Decide whether the request holding `ticket` crashes
    ///
    /// Call only once the handler has produced a successful response.
    /// A ticket taken before the last reset never fires.
    pub fn crash_decision(&self, ticket: CrashTicket) -> Option<CrashMode> {
        if !self.crash.triggers(ticket.request_number) {
            return None;
        }
        if !self.crash_counters.record_activation(ticket.generation) {
            debug!(
                request_number = ticket.request_number,
                "Crash ticket predates a reset, ignored"
            );
            return None;
        }
        warn!(
            request_number = ticket.request_number,
            mode = ?self.crash.mode,
            "Crash simulation activated after commit"
        );
        Some(self.crash.mode)
    }

    /// Latency policy statistics
    pub fn latency_stats(&self) -> LatencyStats {
        let counters = self.latency_counters.snapshot();
        LatencyStats {
            enabled: self.latency.enabled,
            total_requests: counters.total_requests,
            activations: counters.activations,
            latency_ms: self.latency.latency_ms,
            frequency: self.latency.frequency,
            pattern: self.latency.pattern,
        }
    }

    /// Crash policy statistics
    pub fn crash_stats(&self) -> CrashStats {
        let counters = self.crash_counters.snapshot();
        CrashStats {
            enabled: self.crash.enabled,
            total_requests: counters.total_requests,
            activations: counters.activations,
            probability: self.crash.probability,
            frequency: self.crash.frequency,
            pattern: self.crash.pattern,
            mode: self.crash.mode,
        }
    }

    /// Zero the latency counters and return the fresh statistics
    pub fn reset_latency(&self) -> LatencyStats {
        self.latency_counters.reset();
        self.latency_stats()
    }

    /// Zero the crash counters and return the fresh statistics
    pub fn reset_crash(&self) -> CrashStats {
        self.crash_counters.reset();
        self.crash_stats()
    }
}
