//! Order status value object

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Received, not yet validated
    #[default]
    Pending,
    /// Validated and waiting for the inventory step
    Validated,
    /// Inventory was decremented
    Shipped,
    /// The inventory step failed
    Failed,
}

impl OrderStatus {
    /// Storage and wire representation
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Validated => "validated",
            Self::Shipped => "shipped",
            Self::Failed => "failed",
        }
    }

    /// Whether the inventory step may still be (re)attempted
    pub const fn awaits_inventory(&self) -> bool {
        matches!(self, Self::Pending | Self::Validated | Self::Failed)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "validated" => Ok(Self::Validated),
            "shipped" => Ok(Self::Shipped),
            "failed" => Ok(Self::Failed),
            other => Err(format!("Invalid order status: {other}")),
        }
    }
}
