//! Control operations, depth actions and book sides

use serde::{Deserialize, Serialize};

/// Control frame operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    /// Subscribe to one or more topics
    Subscribe,
    /// Unsubscribe from one or more topics
    Unsubscribe,
    /// Authenticate the connection
    Login,
}

impl Op {
    /// Returns the operation name as used in control frames
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::Login => "login",
        }
    }
}

/// Action carried by a table push
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthAction {
    /// Full replacement of an instrument's book
    Partial,
    /// Incremental delta against the current book
    Update,
    /// Anything else, including a missing action
    #[default]
    Other,
}

impl DepthAction {
    /// Parse the `action` field of a push
    pub fn parse(action: &str) -> Self {
        match action {
            "partial" => Self::Partial,
            "update" => Self::Update,
            _ => Self::Other,
        }
    }

    /// Returns true if this action is reconciled against a book
    pub fn is_reconciled(&self) -> bool {
        matches!(self, Self::Partial | Self::Update)
    }
}

/// Book side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Bid side, best (highest) price first
    Bid,
    /// Ask side, best (lowest) price first
    Ask,
}
