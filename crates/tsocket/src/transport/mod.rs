//! Socket transport for event connections.
//!
//! The listener binds a TCP or Unix endpoint and runs an accept loop on the
//! tokio runtime. Every accepted connection becomes a session: a reader that
//! decodes JSON lines and drives one dispatch pipeline per message, polled
//! first in arrival order, and a writer that drains the connection's outbox.

mod errors;
mod listener;
mod session;
mod stream;

pub use self::errors::ListenerError;
pub(crate) use self::listener::{AcceptLoop, SocketListener};
pub(crate) use self::session::{FaultHook, Session};
#[cfg(test)]
pub(crate) use self::stream::ConnectionStream;

const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
