//! HTTP middleware components
//!
//! Request tracking, fault injection and validated JSON extraction.

pub mod fault_injection;
pub mod request_tracking;
pub mod validation;

pub use fault_injection::{FaultInjectionLayer, GREMLIN_DELAY_HEADER, is_fault_target};
pub use request_tracking::{REQUEST_ID_HEADER, RequestId, RequestTrackingLayer};
pub use validation::{ValidatedJson, ValidationError};
