//! Errors escaping message processing.

use thiserror::Error;

use crate::event::HandlerError;

/// Failure that could not be routed to the client.
///
/// Validation and handler failures are routed to the error handler and never
/// surface here. Only a failing error handler does: it is not retried or
/// routed again, and the connection that produced it is closed.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The error handler returned an error or panicked.
    #[error("error handler for '{event}' failed: {source}")]
    ErrorHandler {
        event: String,
        #[source]
        source: HandlerError,
    },
}

impl DispatchError {
    /// Creates an error-handler failure for `event`.
    pub fn error_handler(event: impl Into<String>, source: HandlerError) -> Self {
        Self::ErrorHandler {
            event: event.into(),
            source,
        }
    }

    /// Name of the event whose processing failed.
    #[must_use]
    pub fn event(&self) -> &str {
        match self {
            Self::ErrorHandler { event, .. } => event,
        }
    }
}
