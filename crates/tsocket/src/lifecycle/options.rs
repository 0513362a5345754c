//! Options accepted by [`Server::listen`](super::Server::listen).

use std::fmt;
use std::net::SocketAddr;

use tsocket_config::{Config, DEFAULT_BACKLOG, DEFAULT_MAX_MESSAGE_BYTES, SocketEndpoint};

/// Host bound when only a port is given.
pub const DEFAULT_LISTEN_HOST: &str = "0.0.0.0";

type ListeningCallback = Box<dyn FnOnce(&BoundAddress) + Send>;

/// Where and how to accept connections.
///
/// ```
/// use tsocket::ListenOptions;
///
/// let options = ListenOptions::new()
///     .hostname("127.0.0.1")
///     .port(3000)
///     .backlog(64)
///     .on_listening(|address| println!("listening on {address}"));
/// assert_eq!(options.endpoint().to_string(), "tcp://127.0.0.1:3000");
/// ```
#[must_use]
pub struct ListenOptions {
    endpoint: SocketEndpoint,
    backlog: u32,
    max_message_bytes: usize,
    on_listening: Option<ListeningCallback>,
}

impl Default for ListenOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenOptions {
    /// TCP on every interface, on a port chosen by the operating system.
    pub fn new() -> Self {
        Self {
            endpoint: SocketEndpoint::tcp(DEFAULT_LISTEN_HOST, 0),
            backlog: DEFAULT_BACKLOG,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            on_listening: None,
        }
    }

    /// Listens on a Unix domain socket at `path`.
    pub fn unix(path: impl Into<String>) -> Self {
        Self {
            endpoint: SocketEndpoint::unix(path.into()),
            ..Self::new()
        }
    }

    /// Takes the endpoint, backlog and message limit from `config`.
    pub fn from_config(config: &Config) -> Self {
        Self {
            endpoint: config.listen_socket().clone(),
            backlog: config.backlog(),
            max_message_bytes: config.max_message_bytes(),
            on_listening: None,
        }
    }

    /// Sets the TCP port; `0` asks the operating system for a free one.
    pub fn port(mut self, port: u16) -> Self {
        let host = match self.endpoint {
            SocketEndpoint::Tcp { host, .. } => host,
            SocketEndpoint::Unix { .. } => DEFAULT_LISTEN_HOST.to_owned(),
        };
        self.endpoint = SocketEndpoint::tcp(host, port);
        self
    }

    /// Sets the TCP host name or address.
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        let port = match self.endpoint {
            SocketEndpoint::Tcp { port, .. } => port,
            SocketEndpoint::Unix { .. } => 0,
        };
        self.endpoint = SocketEndpoint::tcp(hostname, port);
        self
    }

    /// Sets the pending-connection queue length.
    pub const fn backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    /// Sets the largest accepted inbound line in bytes.
    pub const fn max_message_bytes(mut self, limit: usize) -> Self {
        self.max_message_bytes = limit;
        self
    }

    /// Registers a callback invoked once the listener is ready.
    pub fn on_listening(mut self, callback: impl FnOnce(&BoundAddress) + Send + 'static) -> Self {
        self.on_listening = Some(Box::new(callback));
        self
    }

    /// Endpoint that will be bound.
    #[must_use]
    pub const fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    pub(crate) const fn backlog_value(&self) -> u32 {
        self.backlog
    }

    pub(crate) const fn message_limit(&self) -> usize {
        self.max_message_bytes
    }

    pub(crate) fn take_on_listening(&mut self) -> Option<ListeningCallback> {
        self.on_listening.take()
    }
}

impl fmt::Debug for ListenOptions {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ListenOptions")
            .field("endpoint", &self.endpoint)
            .field("backlog", &self.backlog)
            .field("max_message_bytes", &self.max_message_bytes)
            .field("on_listening", &self.on_listening.is_some())
            .finish()
    }
}

/// Address a listening server accepts connections on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundAddress {
    /// Resolved TCP address, with the actual port when `0` was requested.
    Tcp(SocketAddr),
    /// Configured endpoint, reported as given (Unix sockets).
    Endpoint(SocketEndpoint),
}

impl BoundAddress {
    /// TCP address, when bound over TCP.
    #[must_use]
    pub const fn tcp_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::Tcp(addr) => Some(*addr),
            Self::Endpoint(_) => None,
        }
    }
}

impl fmt::Display for BoundAddress {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(addr) => write!(formatter, "tcp://{addr}"),
            Self::Endpoint(endpoint) => write!(formatter, "{endpoint}"),
        }
    }
}
