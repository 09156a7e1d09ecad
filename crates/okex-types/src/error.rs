//! Protocol-level errors: topic construction, level parsing, classification

use thiserror::Error;

/// Errors raised while building control messages or decoding pushes
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Subscription topic without a channel
    #[error("subscription topic requires a non-empty channel")]
    EmptyChannel,

    /// Price or size text that is not a finite decimal number
    #[error("invalid {field} {value:?} in price level")]
    InvalidNumber {
        /// Which field failed ("price" or "size")
        field: &'static str,
        /// The offending text
        value: String,
    },

    /// No known response shape matched the raw message
    #[error("no known response shape{}", last_error_suffix(.last_error))]
    Unrecognized {
        /// Last underlying decode error, if any candidate failed to decode
        last_error: Option<String>,
        /// The raw message, lossily decoded
        raw: String,
    },

    /// Failed to serialize a control message
    #[error("failed to serialize control message: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn last_error_suffix(last: &Option<String>) -> String {
    match last {
        Some(e) => format!(": {}", e),
        None => String::new(),
    }
}

impl ProtocolError {
    /// Create an invalid number error
    pub fn invalid_number(field: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidNumber {
            field,
            value: value.into(),
        }
    }
}

/// Result type alias for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;
