//! Response handler boundary
//!
//! The agent hands every classified response to a [`ResponseHandler`] from
//! its dispatch task. Depth pushes arrive only after reconciliation, reduced
//! to the instruments whose books verified. Handlers run inline on the
//! dispatch task and should return quickly.

use crate::error::AgentError;
use okex_types::Response;
use std::sync::Arc;
use tracing::warn;

/// Error returned by a handler
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result returned by a handler
pub type HandlerResult = Result<(), HandlerError>;

/// Receiver of agent output
pub trait ResponseHandler: Send + Sync + 'static {
    /// Called for every event, table and verified depth response
    fn on_response(&self, response: &Response) -> HandlerResult;

    /// Called for non-fatal errors and for the transport error that ended a session
    fn on_error(&self, error: &AgentError) {
        warn!(error = %error, fatal = error.is_fatal(), "agent error");
    }
}

impl<T: ResponseHandler + ?Sized> ResponseHandler for Arc<T> {
    fn on_response(&self, response: &Response) -> HandlerResult {
        (**self).on_response(response)
    }

    fn on_error(&self, error: &AgentError) {
        (**self).on_error(error)
    }
}

/// Handler built from a closure
pub struct FnHandler<F>(F);

impl<F> ResponseHandler for FnHandler<F>
where
    F: Fn(&Response) -> HandlerResult + Send + Sync + 'static,
{
    fn on_response(&self, response: &Response) -> HandlerResult {
        (self.0)(response)
    }
}

/// Adapt a closure into a [`ResponseHandler`]
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&Response) -> HandlerResult + Send + Sync + 'static,
{
    FnHandler(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_handler_fn() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handler = handler_fn(move |response| {
            assert_eq!(response.kind(), "pong");
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        handler.on_response(&Response::Pong).unwrap();
        handler.on_error(&AgentError::NotConnected);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handler_error_propagates() {
        let handler = handler_fn(|_| Err("rejected".into()));
        let err = handler.on_response(&Response::Pong).unwrap_err();
        assert_eq!(err.to_string(), "rejected");
    }
}
