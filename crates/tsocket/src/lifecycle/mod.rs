//! Server lifecycle: registration, listening and shutdown.
//!
//! A [`Server`] moves through [`LifecycleState`]s in one direction:
//! `Created → Initialized → Listening → Closing → Closed`. Registration is
//! one-shot; listening before registration yields a server that accepts
//! connections but routes nothing. Transitions are reported to a
//! [`LifecycleReporter`], which logs through `tracing` by default.

mod errors;
mod options;
mod reporter;
mod server;

pub use self::errors::LifecycleError;
pub use self::options::{BoundAddress, DEFAULT_LISTEN_HOST, ListenOptions};
#[cfg(test)]
pub(crate) use self::reporter::MockLifecycleReporter;
pub use self::reporter::{DisconnectReason, LifecycleReporter, StructuredLifecycleReporter};
pub use self::server::{LifecycleState, Server};

const LIFECYCLE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::lifecycle");

#[cfg(test)]
mod tests;
