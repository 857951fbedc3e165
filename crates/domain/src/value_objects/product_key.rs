//! Product key value object
//!
//! Identifies a stock item. Keys are trimmed and must be between 1 and
//! 64 characters long.
//!
//! # Examples
//!
//! ```
//! use domain::ProductKey;
//!
//! let key = ProductKey::new("  SKU-1 ").unwrap();
//! assert_eq!(key.as_str(), "SKU-1");
//!
//! assert!(ProductKey::new("").is_err());
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::DomainError;

/// Maximum length of a product key
pub const MAX_PRODUCT_KEY_LEN: u64 = 64;

/// A validated product key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Validate)]
#[serde(try_from = "String", into = "String")]
pub struct ProductKey {
    #[validate(length(min = 1, max = 64))]
    value: String,
}

impl ProductKey {
    /// Create a new product key, validating its length
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ValidationError` if the key is empty or too long.
    pub fn new(key: impl Into<String>) -> Result<Self, DomainError> {
        let candidate = Self {
            value: key.into().trim().to_string(),
        };
        candidate.validate().map_err(|_| {
            DomainError::validation(format!(
                "product key must be between 1 and {MAX_PRODUCT_KEY_LEN} characters"
            ))
        })?;
        Ok(candidate)
    }

    /// Get the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for ProductKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl TryFrom<String> for ProductKey {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ProductKey {
    type Error = DomainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ProductKey> for String {
    fn from(key: ProductKey) -> Self {
        key.value
    }
}

impl AsRef<str> for ProductKey {
    fn as_ref(&self) -> &str {
        &self.value
    }
}
