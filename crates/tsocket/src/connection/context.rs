//! Per-connection handle passed to event and error handlers.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::hub::{ConnectionHub, ConnectionId, OutboundReceiver, PeerAddr};
use crate::protocol::OutboundMessage;

const CONNECTION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::connection");

/// Errors raised while emitting to clients.
#[derive(Debug, Error)]
pub enum EmitError {
    /// Payload could not be converted to JSON.
    #[error("failed to serialise payload for '{event}': {source}")]
    Serialise {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One live connection plus access to every other connection on the server.
///
/// Contexts are cheap to clone. Emitting after the client has disconnected
/// is not an error; the message is dropped.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    id: ConnectionId,
    peer: PeerAddr,
    hub: Arc<ConnectionHub>,
}

impl ConnectionContext {
    /// Attaches a new connection to `hub`.
    ///
    /// The receiver yields everything emitted to the connection. Socket
    /// connections are opened by the server; call this directly to drive a
    /// [`Dispatcher`](crate::Dispatcher) in-process.
    #[must_use]
    pub fn open(hub: &Arc<ConnectionHub>, peer: PeerAddr) -> (Self, OutboundReceiver) {
        let (id, receiver) = hub.attach();
        let context = Self {
            id,
            peer,
            hub: Arc::clone(hub),
        };
        (context, receiver)
    }

    /// Detaches the connection from its hub.
    pub fn close(&self) -> bool {
        self.hub.detach(self.id)
    }

    /// Server-unique connection id.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Remote address of the client.
    #[must_use]
    pub const fn peer(&self) -> PeerAddr {
        self.peer
    }

    /// Hub shared by every connection on the server.
    #[must_use]
    pub fn hub(&self) -> &Arc<ConnectionHub> {
        &self.hub
    }

    /// Whether the connection is still attached.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.hub.contains(self.id)
    }

    /// Sends `data` to this connection under `event`.
    ///
    /// # Errors
    ///
    /// Returns [`EmitError::Serialise`] when `data` cannot be encoded.
    pub fn emit<T>(&self, event: impl Into<String>, data: &T) -> Result<(), EmitError>
    where
        T: Serialize + ?Sized,
    {
        let message = encode(event.into(), data)?;
        self.deliver(message);
        Ok(())
    }

    /// Sends an already-encoded payload to this connection.
    pub fn emit_value(&self, event: impl Into<String>, data: Value) {
        self.deliver(OutboundMessage::new(event, data));
    }

    /// Sends `data` to every connection, this one included; returns the
    /// number of recipients.
    ///
    /// # Errors
    ///
    /// Returns [`EmitError::Serialise`] when `data` cannot be encoded.
    pub fn broadcast<T>(&self, event: impl Into<String>, data: &T) -> Result<usize, EmitError>
    where
        T: Serialize + ?Sized,
    {
        let message = encode(event.into(), data)?;
        Ok(self.hub.broadcast(&message, None))
    }

    /// Sends `data` to every connection except this one; returns the number
    /// of recipients.
    ///
    /// # Errors
    ///
    /// Returns [`EmitError::Serialise`] when `data` cannot be encoded.
    pub fn broadcast_others<T>(
        &self,
        event: impl Into<String>,
        data: &T,
    ) -> Result<usize, EmitError>
    where
        T: Serialize + ?Sized,
    {
        let message = encode(event.into(), data)?;
        Ok(self.hub.broadcast(&message, Some(self.id)))
    }

    fn deliver(&self, message: OutboundMessage) {
        let event = message.event.clone();
        if !self.hub.send_to(self.id, message) {
            debug!(
                target: CONNECTION_TARGET,
                connection = %self.id,
                event = %event,
                "dropped message for closed connection"
            );
        }
    }
}

fn encode<T>(event: String, data: &T) -> Result<OutboundMessage, EmitError>
where
    T: Serialize + ?Sized,
{
    match serde_json::to_value(data) {
        Ok(value) => Ok(OutboundMessage::new(event, value)),
        Err(source) => Err(EmitError::Serialise { event, source }),
    }
}
