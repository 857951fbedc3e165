//! Circuit breaker pattern for external service calls
//!
//! Implements the circuit breaker pattern to prevent cascading failures
//! when a downstream service is unavailable.
//!
//! # States
//!
//! - **Closed**: Normal operation, calls pass through and their outcomes are
//!   recorded in a rolling window
//! - **Open**: The failure percentage exceeded the threshold, calls fail fast
//! - **Half-Open**: The reset timeout elapsed and a single trial call is
//!   admitted to test whether the service has recovered
//!
//! State lives in memory only. Transitions are logged and broadcast as
//! [`CircuitEvent`]s.
//!
//! # Example
//!
//! ```rust,ignore
//! use infrastructure::adapters::CircuitBreaker;
//!
//! let cb = CircuitBreaker::new("inventory");
//! let result = cb.call(|| async {
//!     external_service.call().await
//! }).await;
//! ```

use std::{collections::VecDeque, fmt, future::Future, time::Duration};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::{sync::broadcast, time::Instant};
use tracing::{debug, info, warn};

const WINDOW_BUCKETS: u32 = 10;
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Configuration for a circuit breaker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Upper bound for a single call, including all of its retries
    pub call_timeout: Duration,
    /// Failure percentage in the rolling window above which the circuit opens
    pub error_threshold_percentage: u8,
    /// Time to stay open before admitting a trial call
    pub reset_timeout: Duration,
    /// Length of the rolling statistics window
    pub rolling_window: Duration,
    /// Minimum number of calls in the window before the threshold applies
    pub volume_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
            error_threshold_percentage: 50,
            reset_timeout: Duration::from_secs(10),
            rolling_window: Duration::from_secs(10),
            volume_threshold: 0,
        }
    }
}

impl CircuitBreakerConfig {
    fn bucket_width(&self) -> Duration {
        (self.rolling_window / WINDOW_BUCKETS).max(Duration::from_millis(1))
    }
}

/// State of a circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    /// Normal operation, requests pass through
    Closed,
    /// Service is down, requests fail fast
    Open,
    /// Testing if the service has recovered
    HalfOpen,
}

impl CircuitState {
    /// Numeric encoding used by the metrics endpoint
    pub const fn as_gauge(self) -> u8 {
        match self {
            Self::Closed => 0,
            Self::Open => 1,
            Self::HalfOpen => 2,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// A state transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitEvent {
    /// Name of the breaker
    pub breaker: String,
    pub from: CircuitState,
    pub to: CircuitState,
    pub at: DateTime<Utc>,
}

/// Error returned when the circuit is open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitOpenError {
    /// Name of the service
    pub service_name: String,
}

impl std::error::Error for CircuitOpenError {}

impl fmt::Display for CircuitOpenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Circuit breaker open for service '{}': service is temporarily unavailable",
            self.service_name
        )
    }
}

/// Counts over the rolling window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RollingStats {
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub total: u64,
    pub error_percentage: f64,
}

/// Counts since the breaker was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CumulativeStats {
    pub calls: u64,
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
    /// Calls refused without being attempted
    pub rejections: u64,
    pub times_opened: u64,
}

/// Snapshot of a breaker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub last_transition_at: DateTime<Utc>,
    pub rolling: RollingStats,
    pub cumulative: CumulativeStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
    Timeout,
}

#[derive(Debug)]
struct Bucket {
    started: Instant,
    successes: u64,
    failures: u64,
    timeouts: u64,
}

impl Bucket {
    const fn new(started: Instant) -> Self {
        Self {
            started,
            successes: 0,
            failures: 0,
            timeouts: 0,
        }
    }
}

/// Internal state tracking
struct CircuitBreakerState {
    state: CircuitState,
    buckets: VecDeque<Bucket>,
    opened_at: Option<Instant>,
    last_transition_at: DateTime<Utc>,
    trial_in_flight: bool,
    cumulative: CumulativeStats,
}

impl CircuitBreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            buckets: VecDeque::with_capacity(WINDOW_BUCKETS as usize),
            opened_at: None,
            last_transition_at: Utc::now(),
            trial_in_flight: false,
            cumulative: CumulativeStats::default(),
        }
    }

    fn evict_expired(&mut self, now: Instant, window: Duration) {
        while self
            .buckets
            .front()
            .is_some_and(|bucket| now.duration_since(bucket.started) >= window)
        {
            self.buckets.pop_front();
        }
    }

    fn record(&mut self, outcome: Outcome, now: Instant, config: &CircuitBreakerConfig) {
        self.evict_expired(now, config.rolling_window);
        let needs_bucket = self
            .buckets
            .back()
            .is_none_or(|bucket| now.duration_since(bucket.started) >= config.bucket_width());
        if needs_bucket {
            self.buckets.push_back(Bucket::new(now));
        }
        if let Some(bucket) = self.buckets.back_mut() {
            match outcome {
                Outcome::Success => bucket.successes += 1,
                Outcome::Failure => bucket.failures += 1,
                Outcome::Timeout => bucket.timeouts += 1,
            }
        }

        self.cumulative.calls += 1;
        match outcome {
            Outcome::Success => self.cumulative.successes += 1,
            Outcome::Failure => self.cumulative.failures += 1,
            Outcome::Timeout => self.cumulative.timeouts += 1,
        }
    }

    fn rolling(&self) -> RollingStats {
        let mut stats = RollingStats::default();
        for bucket in &self.buckets {
            stats.successes += bucket.successes;
            stats.failures += bucket.failures;
            stats.timeouts += bucket.timeouts;
        }
        stats.total = stats.successes + stats.failures + stats.timeouts;
        if stats.total > 0 {
            #[allow(clippy::cast_precision_loss)]
            let pct = (stats.failures + stats.timeouts) as f64 * 100.0 / stats.total as f64;
            stats.error_percentage = pct;
        }
        stats
    }
}

/// Circuit breaker wrapper for external service calls
///
/// Wraps any async operation with circuit breaker protection,
/// preventing cascading failures when services are unavailable.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<CircuitBreakerState>,
    events: broadcast::Sender<CircuitEvent>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Admission ticket for one call
///
/// A ticket dropped without being settled belongs to a cancelled call and is
/// recorded as a failure.
struct CallGuard<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl CallGuard<'_> {
    fn settle(mut self, outcome: Outcome) {
        self.settled = true;
        self.breaker.on_complete(outcome, self.trial);
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            debug!(service = %self.breaker.name, "Call cancelled before completion");
            self.breaker.on_complete(Outcome::Failure, self.trial);
        }
    }
}

impl CircuitBreaker {
    /// Creates a new circuit breaker with default configuration
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, CircuitBreakerConfig::default())
    }

    /// Creates a new circuit breaker with custom configuration
    #[must_use]
    pub fn with_config(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            name: name.into(),
            config,
            state: Mutex::new(CircuitBreakerState::new()),
            events,
        }
    }

    /// Returns the name of this circuit breaker
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the configuration of this circuit breaker
    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Returns the current state of the circuit breaker
    ///
    /// An open breaker whose reset timeout has elapsed still reports
    /// `Open` until the next call is admitted as the half-open trial.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.state.lock().state
    }

    /// Returns true if the circuit is closed (normal operation)
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state() == CircuitState::Closed
    }

    /// Returns true if the circuit is open (service unavailable)
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Subscribe to state transitions
    pub fn subscribe(&self) -> broadcast::Receiver<CircuitEvent> {
        self.events.subscribe()
    }

    /// Snapshot of the current state and statistics
    pub fn stats(&self) -> CircuitBreakerStats {
        let mut state = self.state.lock();
        state.evict_expired(Instant::now(), self.config.rolling_window);
        CircuitBreakerStats {
            name: self.name.clone(),
            state: state.state,
            last_transition_at: state.last_transition_at,
            rolling: state.rolling(),
            cumulative: state.cumulative,
        }
    }

    fn transition(&self, state: &mut CircuitBreakerState, to: CircuitState) {
        let from = state.state;
        if from == to {
            return;
        }
        state.state = to;
        state.last_transition_at = Utc::now();
        match to {
            CircuitState::Open => {
                state.opened_at = Some(Instant::now());
                state.cumulative.times_opened += 1;
                warn!(service = %self.name, %from, %to, "Circuit breaker opened");
            },
            CircuitState::Closed => {
                state.opened_at = None;
                state.buckets.clear();
                info!(service = %self.name, %from, %to, "Circuit breaker closed");
            },
            CircuitState::HalfOpen => {
                info!(service = %self.name, %from, %to, "Circuit breaker half-open, admitting trial call");
            },
        }

        // No receivers is not an error for the breaker
        let _ = self.events.send(CircuitEvent {
            breaker: self.name.clone(),
            from,
            to,
            at: state.last_transition_at,
        });
    }

    fn admit(&self) -> Result<CallGuard<'_>, CircuitOpenError> {
        let mut state = self.state.lock();
        let trial = match state.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let elapsed = state
                    .opened_at
                    .map_or(Duration::MAX, |opened_at| opened_at.elapsed());
                if elapsed < self.config.reset_timeout {
                    state.cumulative.rejections += 1;
                    return Err(self.open_error());
                }
                self.transition(&mut state, CircuitState::HalfOpen);
                state.trial_in_flight = true;
                true
            },
            CircuitState::HalfOpen => {
                if state.trial_in_flight {
                    state.cumulative.rejections += 1;
                    return Err(self.open_error());
                }
                state.trial_in_flight = true;
                true
            },
        };
        Ok(CallGuard {
            breaker: self,
            trial,
            settled: false,
        })
    }

    fn open_error(&self) -> CircuitOpenError {
        CircuitOpenError {
            service_name: self.name.clone(),
        }
    }

    fn on_complete(&self, outcome: Outcome, trial: bool) {
        let mut state = self.state.lock();
        state.record(outcome, Instant::now(), &self.config);

        if trial {
            state.trial_in_flight = false;
            if state.state == CircuitState::HalfOpen {
                let next = if outcome == Outcome::Success {
                    CircuitState::Closed
                } else {
                    CircuitState::Open
                };
                self.transition(&mut state, next);
            }
            return;
        }

        if state.state == CircuitState::Closed && outcome != Outcome::Success {
            let rolling = state.rolling();
            if rolling.total >= u64::from(self.config.volume_threshold)
                && rolling.error_percentage > f64::from(self.config.error_threshold_percentage)
            {
                debug!(
                    service = %self.name,
                    error_percentage = rolling.error_percentage,
                    total = rolling.total,
                    "Error threshold exceeded"
                );
                self.transition(&mut state, CircuitState::Open);
            }
        }
    }

    /// Calls an async operation through the circuit breaker
    ///
    /// If the circuit is open, returns `CircuitOpenError` immediately.
    /// Otherwise, executes the operation under the call timeout and tracks
    /// its success or failure. `Ok` results count as successes, so callers
    /// that want a service-level refusal to keep the circuit closed return
    /// it inside `Ok`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The circuit is open (`CircuitOpen`)
    /// - The call timeout elapsed (`Timeout`)
    /// - The inner operation fails (the original error)
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Debug,
    {
        let guard = match self.admit() {
            Ok(guard) => guard,
            Err(err) => {
                warn!(
                    service = %self.name,
                    "Circuit breaker preventing call to service"
                );
                return Err(CircuitBreakerError::CircuitOpen(err));
            },
        };

        debug!(
            service = %self.name,
            trial = guard.trial,
            "Calling service through circuit breaker"
        );

        match tokio::time::timeout(self.config.call_timeout, f()).await {
            Ok(Ok(result)) => {
                debug!(service = %self.name, "Service call succeeded");
                guard.settle(Outcome::Success);
                Ok(result)
            },
            Ok(Err(e)) => {
                warn!(service = %self.name, error = ?e, "Service call failed");
                guard.settle(Outcome::Failure);
                Err(CircuitBreakerError::ServiceError(e))
            },
            Err(_) => {
                warn!(
                    service = %self.name,
                    timeout_ms = self.config.call_timeout.as_millis(),
                    "Service call timed out"
                );
                guard.settle(Outcome::Timeout);
                Err(CircuitBreakerError::Timeout(self.config.call_timeout))
            },
        }
    }
}

/// Error type for circuit breaker operations
#[derive(Debug)]
pub enum CircuitBreakerError<E> {
    /// The circuit is open, preventing the call
    CircuitOpen(CircuitOpenError),
    /// The call did not complete within the call timeout
    Timeout(Duration),
    /// The underlying service returned an error
    ServiceError(E),
}

impl<E: fmt::Display> fmt::Display for CircuitBreakerError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CircuitOpen(e) => write!(f, "{e}"),
            Self::Timeout(limit) => write!(f, "call timed out after {}ms", limit.as_millis()),
            Self::ServiceError(e) => write!(f, "{e}"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for CircuitBreakerError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::CircuitOpen(e) => Some(e),
            Self::Timeout(_) => None,
            Self::ServiceError(e) => Some(e),
        }
    }
}
