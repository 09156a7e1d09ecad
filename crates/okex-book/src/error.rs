//! Book reconciliation errors

use okex_types::ProtocolError;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised while reconciling a depth push against a book
#[derive(Error, Debug)]
pub enum BookError {
    /// Locally derived checksum differs from the one in the push
    #[error("checksum mismatch for {instrument}: expected {expected}, computed {computed}")]
    ChecksumMismatch {
        /// Instrument that had the mismatch
        instrument: String,
        /// Expected checksum from the exchange
        expected: i32,
        /// Checksum computed locally
        computed: i32,
        /// The string that was hashed
        payload: String,
    },

    /// Best bid at or above best ask after applying a push
    #[error("crossed book for {instrument}: best bid {bid} >= best ask {ask}")]
    Crossed {
        /// Instrument with the crossed book
        instrument: String,
        /// Best bid price
        bid: Decimal,
        /// Best ask price
        ask: Decimal,
    },

    /// A level in the push could not be parsed
    #[error("invalid level for {instrument}: {source}")]
    InvalidLevel {
        /// Instrument the level belongs to
        instrument: String,
        /// Underlying parse failure
        #[source]
        source: ProtocolError,
    },

    /// Depth payload without an instrument id
    #[error("depth push for {table} has an entry without instrument_id")]
    MissingInstrument {
        /// Table of the push
        table: String,
    },

    /// Push routed to the books of another table
    #[error("table mismatch: books hold {expected}, push is for {actual}")]
    TableMismatch {
        /// Table the books were created for
        expected: String,
        /// Table named in the push
        actual: String,
    },
}

impl BookError {
    /// Instrument the error concerns, if any
    pub fn instrument(&self) -> Option<&str> {
        match self {
            Self::ChecksumMismatch { instrument, .. }
            | Self::Crossed { instrument, .. }
            | Self::InvalidLevel { instrument, .. } => Some(instrument),
            Self::MissingInstrument { .. } | Self::TableMismatch { .. } => None,
        }
    }

    /// Returns true if the book must be resynchronized from a snapshot
    pub fn needs_snapshot(&self) -> bool {
        matches!(self, Self::ChecksumMismatch { .. } | Self::Crossed { .. })
    }
}

/// Result type alias for book operations
pub type BookResult<T> = Result<T, BookError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_mismatch_display() {
        let err = BookError::ChecksumMismatch {
            instrument: "BTC-USDT".into(),
            expected: -1,
            computed: 42,
            payload: "1:1".into(),
        };
        assert_eq!(
            err.to_string(),
            "checksum mismatch for BTC-USDT: expected -1, computed 42"
        );
        assert_eq!(err.instrument(), Some("BTC-USDT"));
        assert!(err.needs_snapshot());
    }

    #[test]
    fn test_invalid_level_keeps_source() {
        let err = BookError::InvalidLevel {
            instrument: "ETH-USDT".into(),
            source: ProtocolError::invalid_number("size", "abc"),
        };
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.needs_snapshot());
    }

    #[test]
    fn test_crossed_display() {
        let err = BookError::Crossed {
            instrument: "X".into(),
            bid: dec!(101),
            ask: dec!(100),
        };
        assert!(err.to_string().contains("101 >= best ask 100"));
    }
}
