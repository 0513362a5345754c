use crate::logging::LogFormat;
use crate::socket::SocketEndpoint;

/// Host the server binds when nothing else is configured.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Port the server binds when nothing else is configured.
pub const DEFAULT_PORT: u16 = 3000;

/// Pending-connection queue length handed to `listen(2)`.
pub const DEFAULT_BACKLOG: u32 = 1024;

/// Upper bound on a single inbound message line, newline included.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Endpoint used when no listen socket is configured.
#[must_use]
pub fn default_socket_endpoint() -> SocketEndpoint {
    SocketEndpoint::tcp(DEFAULT_HOST, DEFAULT_PORT)
}

/// Default listen backlog.
#[must_use]
pub const fn default_backlog() -> u32 {
    DEFAULT_BACKLOG
}

/// Default inbound message size limit.
#[must_use]
pub const fn default_max_message_bytes() -> usize {
    DEFAULT_MAX_MESSAGE_BYTES
}

/// Default log filter expression.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value for serde defaults.
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}
