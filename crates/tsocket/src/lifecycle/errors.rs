//! Error types for server lifecycle transitions.

use thiserror::Error;

use crate::registry::RegistrationError;
use crate::transport::ListenerError;

/// Errors raised by [`Server`](super::Server) lifecycle calls.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// `close` was called on a server that is not listening.
    #[error("server is not listening")]
    NotListening,
    /// `listen` was called on a server that is already listening.
    #[error("server is already listening")]
    AlreadyListening,
    /// `listen` was called while a previous listener is still draining.
    #[error("server is closing")]
    Closing,
    /// Event registration failed.
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    /// The listener could not be bound.
    #[error(transparent)]
    Listener(#[from] ListenerError),
}
