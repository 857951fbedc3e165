//! API error handling
//!
//! Every failure leaves the service as a JSON body of the form
//! `{"error": ..., "code": ...}`. Stock shortages additionally carry the
//! available and requested quantities so callers can react without parsing
//! the message.

use application::ApplicationError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use domain::DomainError;
use serde::Serialize;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient stock for {product_key}: available {available}, requested {requested}")]
    InsufficientResource {
        product_key: String,
        available: i64,
        requested: i64,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Quantities reported with an insufficient stock error
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Shortage {
    pub product_key: String,
    pub available: i64,
    pub requested: i64,
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// Error code
    pub code: String,
    /// Additional error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(flatten)]
    pub shortage: Option<Shortage>,
}

impl ApiError {
    /// HTTP status for this error
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InsufficientResource { .. } | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code
    pub const fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::NotFound(_) => "not_found",
            Self::InsufficientResource { .. } => "insufficient_resource",
            Self::Conflict(_) => "conflict",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::Internal(_) => "internal_error",
        }
    }

    fn into_body(self) -> ErrorResponse {
        let code = self.code().to_string();
        match self {
            Self::BadRequest(msg)
            | Self::NotFound(msg)
            | Self::Conflict(msg)
            | Self::ServiceUnavailable(msg) => ErrorResponse {
                error: msg,
                code,
                details: None,
                shortage: None,
            },
            Self::InsufficientResource {
                product_key,
                available,
                requested,
            } => ErrorResponse {
                error: "Insufficient stock".to_string(),
                code,
                details: None,
                shortage: Some(Shortage {
                    product_key,
                    available,
                    requested,
                }),
            },
            Self::Internal(msg) => ErrorResponse {
                error: "An internal error occurred".to_string(),
                code,
                details: Some(msg),
                shortage: None,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(self.into_body())).into_response()
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotFound { .. } => Self::NotFound(err.to_string()),
            DomainError::InsufficientResource {
                product_key,
                available,
                requested,
            } => Self::InsufficientResource {
                product_key,
                available,
                requested,
            },
            DomainError::ValidationError(msg) => Self::BadRequest(msg),
            DomainError::InvalidStateTransition(msg) => Self::Conflict(msg),
        }
    }
}

impl From<ApplicationError> for ApiError {
    fn from(err: ApplicationError) -> Self {
        match err {
            ApplicationError::Domain(e) => e.into(),
            ApplicationError::NotFound(msg) => Self::NotFound(msg),
            ApplicationError::Conflict(msg) => Self::Conflict(msg),
            ApplicationError::ExternalService(msg) => Self::ServiceUnavailable(msg),
            ApplicationError::Configuration(msg) | ApplicationError::Internal(msg) => {
                Self::Internal(msg)
            },
        }
    }
}
