//! Fault injection for resilience testing.
//!
//! Simulates the failures a caller has to survive: slow responses and a
//! service that dies after committing work but before answering.
//!
//! # Overview
//!
//! - `LatencyPolicy` / `CrashPolicy`: what to inject and how often
//! - `ChaosContext`: per-policy request and activation counters
//! - `FaultInjector`: evaluates both policies for each request
//!
//! # Example
//!
//! ```ignore
//! use infrastructure::chaos::{CrashPolicy, FaultInjector, LatencyPolicy};
//!
//! let injector = FaultInjector::new(LatencyPolicy::default(), CrashPolicy::default());
//!
//! if let Some(delay) = injector.latency_decision() {
//!     tokio::time::sleep(delay).await;
//! }
//! let ticket = injector.crash_ticket();
//! // ... run the handler ...
//! if let Some(mode) = ticket.and_then(|t| injector.crash_decision(t)) {
//!     // sabotage the response
//! }
//! ```

mod chaos_context;
mod fault_injector;
mod fault_policy;

pub use chaos_context::{ChaosContext, CounterSnapshot};
pub use fault_injector::{CrashStats, CrashTicket, FaultInjector, LatencyStats};
pub use fault_policy::{CrashMode, CrashPolicy, LatencyPolicy, TriggerPattern};
