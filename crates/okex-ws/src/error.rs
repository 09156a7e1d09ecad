//! Agent error types

use crate::agent::AgentState;
use crate::transport::TransportError;
use okex_auth::AuthError;
use okex_book::BookError;
use okex_types::ProtocolError;
use thiserror::Error;

/// Errors surfaced by the agent, either returned or reported to the handler
#[derive(Error, Debug)]
pub enum AgentError {
    /// Operation not allowed in the current state
    #[error("cannot {operation} while {state:?}")]
    InvalidState {
        /// Attempted operation
        operation: &'static str,
        /// State at the time
        state: AgentState,
    },

    /// No open session to send on
    #[error("not connected")]
    NotConnected,

    /// Transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Keepalive ping could not be sent
    #[error("keepalive failed: {0}")]
    Keepalive(#[source] TransportError),

    /// Control message construction or decoding failure
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Depth push rejected by the book
    #[error(transparent)]
    Book(#[from] BookError),

    /// Login signing failure
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Error response pushed by the exchange
    #[error("exchange error {code}: {message}")]
    Exchange {
        /// Exchange error code (>= 30000)
        code: i64,
        /// Message from the exchange
        message: String,
    },

    /// Response handler returned an error
    #[error("handler failed: {0}")]
    Handler(String),

    /// Internal task panicked
    #[error("task fault: {0}")]
    TaskFault(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl AgentError {
    /// Returns true if the error ends the session
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::TaskFault(_))
    }
}

/// Result type alias for agent operations
pub type AgentResult<T> = Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatality() {
        assert!(AgentError::Transport(TransportError::ConnectionClosed).is_fatal());
        assert!(AgentError::TaskFault("boom".into()).is_fatal());
        assert!(!AgentError::Keepalive(TransportError::ConnectionClosed).is_fatal());
        assert!(!AgentError::NotConnected.is_fatal());
        assert!(!AgentError::Exchange {
            code: 30001,
            message: "x".into()
        }
        .is_fatal());
    }

    #[test]
    fn test_display() {
        let err = AgentError::InvalidState {
            operation: "start",
            state: AgentState::Connected,
        };
        assert_eq!(err.to_string(), "cannot start while Connected");

        let err = AgentError::Exchange {
            code: 30040,
            message: "channel doesn't exist".into(),
        };
        assert_eq!(err.to_string(), "exchange error 30040: channel doesn't exist");
    }
}
