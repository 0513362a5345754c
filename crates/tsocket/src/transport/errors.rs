//! Failures raised while opening an event endpoint.

use std::io;
use std::net::SocketAddr;
#[cfg(unix)]
use std::path::PathBuf;

use thiserror::Error;
use tsocket_config::{SocketEndpoint, SocketPreparationError};

/// Why a server could not start listening on its endpoint.
///
/// A failed bind leaves the server as it was; callers may fix the endpoint and
/// call `listen` again.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The endpoint's host name could not be looked up.
    #[error("cannot resolve event endpoint {endpoint}: {source}")]
    Unresolvable {
        endpoint: SocketEndpoint,
        #[source]
        source: io::Error,
    },
    /// The host name resolved, but to nothing.
    #[error("event endpoint {endpoint} resolved to no addresses")]
    NoAddress { endpoint: SocketEndpoint },
    /// The TCP address is taken or otherwise refused.
    #[error("cannot accept events on {addr}: {source}")]
    Tcp {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    /// The directory holding the Unix socket could not be created.
    #[error(transparent)]
    SocketDirectory(#[from] SocketPreparationError),
    /// Unix endpoints on a platform without Unix sockets.
    #[cfg(not(unix))]
    #[error("this platform cannot accept events on {endpoint}")]
    UnixUnavailable { endpoint: SocketEndpoint },
    /// Binding the Unix socket failed.
    #[cfg(unix)]
    #[error("cannot accept events on {}: {source}", .path.display())]
    Unix {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// A live server already answers on the socket path.
    #[cfg(unix)]
    #[error("another server is accepting events on {}", .path.display())]
    Occupied { path: PathBuf },
    /// Something other than a socket sits at the socket path.
    #[cfg(unix)]
    #[error("refusing to replace {}: it is not a socket", .path.display())]
    NotASocket { path: PathBuf },
    /// The existing socket file could not be checked for a live server.
    #[cfg(unix)]
    #[error("cannot inspect existing socket {}: {source}", .path.display())]
    Inspect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// A socket left behind by a dead server could not be removed.
    #[cfg(unix)]
    #[error("cannot remove stale socket {}: {source}", .path.display())]
    StaleSocket {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_endpoint() {
        let error = ListenerError::NoAddress {
            endpoint: SocketEndpoint::tcp("nowhere.invalid", 3000),
        };
        assert_eq!(
            error.to_string(),
            "event endpoint tcp://nowhere.invalid:3000 resolved to no addresses"
        );
    }

    #[cfg(unix)]
    #[test]
    fn socket_path_messages_show_the_path() {
        let error = ListenerError::Occupied {
            path: PathBuf::from("/run/tsocket/events.sock"),
        };
        assert_eq!(
            error.to_string(),
            "another server is accepting events on /run/tsocket/events.sock"
        );
    }
}
