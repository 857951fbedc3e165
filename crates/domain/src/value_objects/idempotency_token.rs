//! Idempotency token value object
//!
//! A caller-supplied opaque key that identifies one logical operation across
//! any number of physical deliveries.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Maximum length of an idempotency token
pub const MAX_TOKEN_LEN: usize = 255;

/// A validated idempotency token
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdempotencyToken(String);

impl IdempotencyToken {
    /// Create a token from caller input
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ValidationError` if the token is blank or longer
    /// than [`MAX_TOKEN_LEN`] characters.
    pub fn new(token: impl Into<String>) -> Result<Self, DomainError> {
        let token = token.into();
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("idempotency token must not be blank"));
        }
        if trimmed.chars().count() > MAX_TOKEN_LEN {
            return Err(DomainError::validation(format!(
                "idempotency token must be at most {MAX_TOKEN_LEN} characters"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Derive a token for a downstream step of the same logical operation
    ///
    /// ```
    /// use domain::IdempotencyToken;
    ///
    /// let order = IdempotencyToken::new("order-42").unwrap();
    /// assert_eq!(order.derive("inventory").unwrap().as_str(), "order-42-inventory");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if the derived token exceeds the maximum length.
    pub fn derive(&self, step: &str) -> Result<Self, DomainError> {
        Self::new(format!("{}-{step}", self.0))
    }

    /// Get the token as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for IdempotencyToken {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<IdempotencyToken> for String {
    fn from(token: IdempotencyToken) -> Self {
        token.0
    }
}
