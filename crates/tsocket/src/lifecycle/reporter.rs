//! Structured reporting for server lifecycle events.

use std::fmt;
use std::sync::Arc;

use super::{BoundAddress, LIFECYCLE_TARGET};
use crate::connection::{ConnectionId, PeerAddr};

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
    /// The client closed its end of the stream.
    ClientClosed,
    /// The server asked connections to disconnect.
    ServerShutdown,
    /// An error handler failed while processing a message.
    Fault,
    /// Reading failed or a message exceeded the size limit.
    Transport,
}

impl DisconnectReason {
    /// Lower-case label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClientClosed => "client_closed",
            Self::ServerShutdown => "server_shutdown",
            Self::Fault => "fault",
            Self::Transport => "transport",
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Observer trait used to surface lifecycle events to telemetry sinks.
#[cfg_attr(test, mockall::automock)]
pub trait LifecycleReporter: Send + Sync {
    /// Invoked after events are registered.
    fn events_registered(&self, names: &[String]);

    /// Invoked when a server starts listening with no registered events.
    fn listening_without_events(&self);

    /// Invoked once the listener accepts connections.
    fn listening(&self, address: &BoundAddress);

    /// Invoked when a client connects.
    fn connection_opened(&self, id: ConnectionId, peer: PeerAddr);

    /// Invoked after a connection has ended and its handlers have finished.
    fn connection_closed(&self, id: ConnectionId, reason: DisconnectReason);

    /// Invoked when the server stops accepting connections.
    fn closing(&self, open_connections: usize);

    /// Invoked after every connection has ended.
    fn closed(&self);
}

impl<T> LifecycleReporter for Arc<T>
where
    T: LifecycleReporter,
{
    fn events_registered(&self, names: &[String]) {
        (**self).events_registered(names);
    }

    fn listening_without_events(&self) {
        (**self).listening_without_events();
    }

    fn listening(&self, address: &BoundAddress) {
        (**self).listening(address);
    }

    fn connection_opened(&self, id: ConnectionId, peer: PeerAddr) {
        (**self).connection_opened(id, peer);
    }

    fn connection_closed(&self, id: ConnectionId, reason: DisconnectReason) {
        (**self).connection_closed(id, reason);
    }

    fn closing(&self, open_connections: usize) {
        (**self).closing(open_connections);
    }

    fn closed(&self) {
        (**self).closed();
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredLifecycleReporter;

impl StructuredLifecycleReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl LifecycleReporter for StructuredLifecycleReporter {
    fn events_registered(&self, names: &[String]) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "events_registered",
            count = names.len(),
            events = ?names,
            "events registered"
        );
    }

    fn listening_without_events(&self) {
        tracing::warn!(
            target: LIFECYCLE_TARGET,
            event = "listening_without_events",
            "listening before events were registered; messages will be dropped"
        );
    }

    fn listening(&self, address: &BoundAddress) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "listening",
            address = %address,
            "server listening"
        );
    }

    fn connection_opened(&self, id: ConnectionId, peer: PeerAddr) {
        tracing::debug!(
            target: LIFECYCLE_TARGET,
            event = "connection_opened",
            connection = %id,
            peer = %peer,
            "client connected"
        );
    }

    fn connection_closed(&self, id: ConnectionId, reason: DisconnectReason) {
        tracing::debug!(
            target: LIFECYCLE_TARGET,
            event = "connection_closed",
            connection = %id,
            reason = %reason,
            "client disconnected"
        );
    }

    fn closing(&self, open_connections: usize) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "closing",
            open_connections,
            "server closing"
        );
    }

    fn closed(&self) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "closed",
            "server closed"
        );
    }
}
