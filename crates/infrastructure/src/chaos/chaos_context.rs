//! Request counters scoped to one fault policy.

use parking_lot::Mutex;
use serde::Serialize;

/// Point-in-time view of a policy's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    /// Requests counted since the last reset
    pub total_requests: u64,
    /// Times the policy fired since the last reset
    pub activations: u64,
}

#[derive(Debug, Default)]
struct State {
    counters: CounterSnapshot,
    generation: u64,
}

/// Internally synchronised counters for one policy
///
/// Only increment, read and reset are offered. All three take the same lock,
/// so a reset never interleaves with a half-applied increment. Each reset
/// starts a new generation; activations claimed for an older one are dropped.
#[derive(Debug, Default)]
pub struct ChaosContext {
    state: Mutex<State>,
}

impl ChaosContext {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a request, returning its 1-indexed number and the current generation
    pub fn tick_with_generation(&self) -> (u64, u64) {
        let mut state = self.state.lock();
        state.counters.total_requests += 1;
        (state.counters.total_requests, state.generation)
    }

    /// Count a request and decide on it under the same lock
    ///
    /// Returns the request number and whether `decide` fired.
    pub fn tick_and_decide(&self, decide: impl FnOnce(u64) -> bool) -> (u64, bool) {
        let mut state = self.state.lock();
        state.counters.total_requests += 1;
        let count = state.counters.total_requests;
        let fired = decide(count);
        if fired {
            state.counters.activations += 1;
        }
        (count, fired)
    }

    /// Count an activation for a request ticked in `generation`
    ///
    /// Returns `false` without counting if a reset happened since.
    pub fn record_activation(&self, generation: u64) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation {
            return false;
        }
        state.counters.activations += 1;
        true
    }

    /// Read the counters
    pub fn snapshot(&self) -> CounterSnapshot {
        self.state.lock().counters
    }

    /// Zero the counters and start a new generation, returning the previous values
    pub fn reset(&self) -> CounterSnapshot {
        let mut state = self.state.lock();
        state.generation += 1;
        std::mem::take(&mut state.counters)
    }
}
