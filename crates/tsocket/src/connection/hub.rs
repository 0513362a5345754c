//! Registry of live connection outboxes.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use tokio::sync::mpsc;

use crate::protocol::OutboundMessage;

/// Receiving half of a connection's outbox.
pub type OutboundReceiver = mpsc::UnboundedReceiver<OutboundMessage>;

type Outbox = mpsc::UnboundedSender<OutboundMessage>;

/// Server-unique identifier of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Numeric value of the identifier.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "conn-{}", self.0)
    }
}

/// Remote end of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerAddr {
    /// TCP client address.
    Tcp(SocketAddr),
    /// Unix domain socket client; such peers are unnamed.
    Unix,
    /// Connection opened within the process, without a socket.
    InProcess,
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(addr) => write!(formatter, "{addr}"),
            Self::Unix => formatter.write_str("unix"),
            Self::InProcess => formatter.write_str("in-process"),
        }
    }
}

/// Tracks the outbox of every live connection on a server.
///
/// Sends never block; a message for a connection that has gone away is
/// dropped.
#[derive(Debug)]
pub struct ConnectionHub {
    next_id: AtomicU64,
    outboxes: RwLock<HashMap<ConnectionId, Outbox>>,
}

impl Default for ConnectionHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionHub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            outboxes: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a new connection and returns its id and outbox receiver.
    pub(crate) fn attach(&self) -> (ConnectionId, OutboundReceiver) {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::unbounded_channel();
        self.outboxes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, sender);
        (id, receiver)
    }

    /// Removes a connection; returns `false` when it was already gone.
    pub fn detach(&self, id: ConnectionId) -> bool {
        self.outboxes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    /// Queues `message` for one connection; returns whether it was queued.
    pub fn send_to(&self, id: ConnectionId, message: OutboundMessage) -> bool {
        self.outboxes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .is_some_and(|outbox| outbox.send(message).is_ok())
    }

    /// Queues `message` for every connection except `except`; returns how
    /// many connections it was queued for.
    pub fn broadcast(&self, message: &OutboundMessage, except: Option<ConnectionId>) -> usize {
        self.outboxes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(id, _)| Some(**id) != except)
            .filter(|(_, outbox)| outbox.send(message.clone()).is_ok())
            .count()
    }

    /// Number of attached connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.outboxes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether `id` is still attached.
    #[must_use]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.outboxes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn ids_are_unique_and_monotonic() {
        let hub = ConnectionHub::new();
        let (first, _rx1) = hub.attach();
        let (second, _rx2) = hub.attach();
        assert!(second > first);
        assert_eq!(hub.connection_count(), 2);
    }

    #[test]
    fn send_to_detached_connection_is_dropped() {
        let hub = ConnectionHub::new();
        let (id, _rx) = hub.attach();
        assert!(hub.detach(id));
        assert!(!hub.send_to(id, OutboundMessage::new("late", json!(null))));
        assert!(!hub.detach(id));
    }

    #[test]
    fn broadcast_skips_the_excluded_connection() {
        let hub = ConnectionHub::new();
        let (sender, mut sender_rx) = hub.attach();
        let (_other, mut other_rx) = hub.attach();

        let message = OutboundMessage::new("news", json!(1));
        assert_eq!(hub.broadcast(&message, Some(sender)), 1);
        assert_eq!(other_rx.try_recv().ok(), Some(message));
        assert!(sender_rx.try_recv().is_err());
    }

    #[test]
    fn broadcast_ignores_connections_whose_writer_has_gone() {
        let hub = ConnectionHub::new();
        let (_gone, gone_rx) = hub.attach();
        let (_live, _live_rx) = hub.attach();
        drop(gone_rx);
        assert_eq!(hub.broadcast(&OutboundMessage::new("news", json!(1)), None), 1);
    }
}
