//! Tracing subscriber setup shared by both services
//!
//! Logs go to stdout as text or JSON, filtered by `RUST_LOG` or the
//! configured directive.

mod logging;

pub use logging::{TelemetryError, build_filter, init_tracing};
