//! Application-level errors

use domain::DomainError;
use thiserror::Error;

/// Errors that can occur in the application layer
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// Domain-level error
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Requested entity does not exist outside of domain lookups
    #[error("Not found: {0}")]
    NotFound(String),

    /// Storage write conflict, the operation may be restarted
    #[error("Conflict: {0}")]
    Conflict(String),

    /// External service error
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApplicationError {
    /// Check if this error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApplicationError::Conflict(_) | ApplicationError::ExternalService(_)
        )
    }

    /// Borrow the domain error, if this wraps one
    pub const fn as_domain(&self) -> Option<&DomainError> {
        match self {
            ApplicationError::Domain(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_convert_transparently() {
        let err: ApplicationError = DomainError::validation("bad key").into();
        assert_eq!(err.to_string(), "Validation failed: bad key");
        assert!(err.as_domain().is_some());
    }

    #[test]
    fn conflicts_are_retryable() {
        assert!(ApplicationError::Conflict("database is locked".into()).is_retryable());
        assert!(ApplicationError::ExternalService("down".into()).is_retryable());
    }

    #[test]
    fn permanent_errors_are_not_retryable() {
        let insufficient: ApplicationError = DomainError::InsufficientResource {
            product_key: "SKU-1".into(),
            available: 1,
            requested: 2,
        }
        .into();
        assert!(!insufficient.is_retryable());
        assert!(!ApplicationError::NotFound("x".into()).is_retryable());
        assert!(!ApplicationError::Internal("x".into()).is_retryable());
    }
}
