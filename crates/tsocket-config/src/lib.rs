//! Configuration shared by tsocket servers.
//!
//! [`Config`] is layered by `ortho_config`: built-in defaults, then
//! configuration files, then `TSOCKET_*` environment variables, then command
//! line flags. Servers read the listen endpoint, backlog and message size limit
//! from it; the telemetry subscriber reads the log filter and format.

mod defaults;
mod logging;
mod socket;

use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};

pub use self::defaults::{
    DEFAULT_BACKLOG, DEFAULT_HOST, DEFAULT_LOG_FILTER, DEFAULT_MAX_MESSAGE_BYTES, DEFAULT_PORT,
    default_backlog, default_log_filter, default_log_filter_string, default_log_format,
    default_max_message_bytes, default_socket_endpoint,
};
pub use self::logging::{LogFormat, LogFormatParseError};
pub use self::socket::{SocketEndpoint, SocketParseError, SocketPreparationError};

/// Resolved server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "TSOCKET")]
pub struct Config {
    /// Endpoint the server accepts connections on.
    #[serde(default = "default_socket_endpoint")]
    pub listen_socket: SocketEndpoint,
    /// Pending-connection queue length for TCP listeners.
    #[serde(default = "default_backlog")]
    pub backlog: u32,
    /// Largest accepted inbound message line in bytes.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
    /// `tracing` filter expression.
    #[serde(default = "default_log_filter_string")]
    pub log_filter: String,
    /// Log output format.
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_socket: default_socket_endpoint(),
            backlog: default_backlog(),
            max_message_bytes: default_max_message_bytes(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Loads configuration from every layer, reading flags from the process
    /// arguments.
    ///
    /// # Errors
    ///
    /// Returns the aggregated loading error when any layer fails to parse.
    pub fn load() -> Result<Self, Arc<OrthoError>> {
        Self::load_from_iter(std::env::args_os())
    }

    /// Endpoint the server listens on.
    #[must_use]
    pub const fn listen_socket(&self) -> &SocketEndpoint {
        &self.listen_socket
    }

    /// Listen backlog.
    #[must_use]
    pub const fn backlog(&self) -> u32 {
        self.backlog
    }

    /// Inbound message size limit in bytes.
    #[must_use]
    pub const fn max_message_bytes(&self) -> usize {
        self.max_message_bytes
    }

    /// `tracing` filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}
