//! Typed, schema-validated event dispatch over persistent socket connections.
//!
//! A [`Server`] registers named events once with [`Server::init`], each built
//! with [`define_event`] from an input [`schema::Schema`], an async handler
//! and an optional error handler. Clients connect over TCP or a Unix socket
//! and exchange JSON lines of the form `{"event": "...", "data": ...}`.
//!
//! Every inbound payload is validated before its handler runs. When
//! validation or the handler fails, the event's error handler decides the
//! reply, which is sent to the originating connection on a response channel
//! derived from the event name (see [`derive_response_channel`]). Without an
//! error handler the reply is `null`. Messages for unknown events are dropped
//! and logged.
//!
//! Configuration comes from [`tsocket_config`]; structured logs go through
//! `tracing` and are installed with [`telemetry::initialise`].

mod channel;
mod connection;
pub mod daemon;
mod dispatch;
mod event;
mod lifecycle;
mod protocol;
mod registry;
pub mod schema;
pub mod telemetry;
mod transport;

pub use channel::{RESPONSE_CHANNEL_PREFIX, ResponseChannel, derive_response_channel};
pub use connection::{
    ConnectionContext, ConnectionHub, ConnectionId, EmitError, OutboundReceiver, PeerAddr,
};
pub use dispatch::{
    ConnectionDispatcher, DispatchError, DispatchOutcome, Dispatcher, FailureEnvelope, FailureKind,
};
pub use event::{EventBuilder, EventDefinition, HandlerError, define_event};
pub use lifecycle::{
    BoundAddress, DEFAULT_LISTEN_HOST, DisconnectReason, LifecycleError, LifecycleReporter,
    LifecycleState, ListenOptions, Server, StructuredLifecycleReporter,
};
pub use protocol::{FrameError, InboundMessage, OutboundMessage, decode_line, encode_line};
pub use registry::{EventRegistry, RegisteredEvent, RegistrationError};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use transport::ListenerError;

#[cfg(test)]
mod tests;
