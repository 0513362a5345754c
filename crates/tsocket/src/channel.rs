//! Deterministic response channels for failure routing.

use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Namespace reserved for derived response channels.
pub const RESPONSE_CHANNEL_PREFIX: &str = "tsocket:error:";

/// Channel on which failures for one event are reported.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ResponseChannel(String);

impl ResponseChannel {
    /// Channel name as sent on the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the channel, returning the owned name.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ResponseChannel {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl AsRef<str> for ResponseChannel {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derives the response channel for `event_name`.
///
/// The result depends on the name alone: it is stable across connections,
/// processes and releases, and distinct names map to distinct channels.
///
/// ```
/// use tsocket::derive_response_channel;
///
/// let channel = derive_response_channel("greet");
/// assert!(channel.as_str().starts_with("tsocket:error:"));
/// assert_eq!(channel, derive_response_channel("greet"));
/// ```
#[must_use]
pub fn derive_response_channel(event_name: &str) -> ResponseChannel {
    let digest = Sha256::digest(event_name.as_bytes());
    ResponseChannel(format!("{RESPONSE_CHANNEL_PREFIX}{}", hex::encode(digest)))
}
