//! Validation-gated routing of inbound messages to event handlers.
//!
//! Each connection gets a [`ConnectionDispatcher`] subscribed to every
//! registered event name. For every inbound message it looks up the event,
//! validates the payload, runs the handler and, when validation or the
//! handler fails, hands a [`FailureEnvelope`] to the error router. The router
//! replies on the event's response channel with the error handler's result, or
//! with `null` when the event has no error handler.
//!
//! Messages naming no registered event are dropped and logged.

mod dispatcher;
mod envelope;
mod errors;
mod router;

pub use self::dispatcher::{ConnectionDispatcher, DispatchOutcome, Dispatcher};
pub use self::envelope::{FailureEnvelope, FailureKind};
pub use self::errors::DispatchError;

const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
