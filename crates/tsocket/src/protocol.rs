//! JSON-lines wire format shared by inbound and outbound messages.
//!
//! Every message is a single JSON object terminated by `\n`:
//!
//! ```text
//! {"event": "greet", "data": {"name": "Ada"}}
//! ```
//!
//! `data` may be omitted on inbound messages, in which case handlers see
//! `null`. Blank lines are ignored.

use std::io;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Message received from a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Event name used for routing.
    pub event: String,
    /// Raw payload, `null` when absent.
    pub data: Value,
}

impl InboundMessage {
    /// Builds a message for `event` carrying `data`.
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// Message delivered to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Event or response channel name.
    pub event: String,
    /// Payload.
    pub data: Value,
}

impl OutboundMessage {
    /// Builds a message for `event` carrying `data`.
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

#[derive(Deserialize)]
struct WireInbound {
    event: Option<String>,
    #[serde(default)]
    data: Value,
}

/// Errors raised while reading or writing frames.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Line was not a JSON object of the expected form.
    #[error("malformed message: {source}")]
    Malformed {
        #[source]
        source: serde_json::Error,
    },
    /// Line parsed but carried no `event` field.
    #[error("message has no event name")]
    MissingEvent,
    /// Line exceeded the configured size limit.
    #[error("message exceeds {limit} byte limit")]
    TooLarge { limit: usize },
    /// Outbound payload could not be encoded.
    #[error("failed to encode outbound message: {0}")]
    Encode(#[source] serde_json::Error),
    /// Underlying stream failed.
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),
}

impl FrameError {
    /// Whether the connection can keep reading after this error.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Malformed { .. } | Self::MissingEvent)
    }
}

/// Decodes one line, returning `Ok(None)` for blank lines.
///
/// # Errors
///
/// Returns [`FrameError::Malformed`] for invalid JSON or a non-object line and
/// [`FrameError::MissingEvent`] when the object has no `event`.
pub fn decode_line(line: &[u8]) -> Result<Option<InboundMessage>, FrameError> {
    let trimmed = line.trim_ascii();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let wire: WireInbound =
        serde_json::from_slice(trimmed).map_err(|source| FrameError::Malformed { source })?;
    let event = wire.event.ok_or(FrameError::MissingEvent)?;
    Ok(Some(InboundMessage {
        event,
        data: wire.data,
    }))
}

/// Encodes `message` as a newline-terminated line.
///
/// # Errors
///
/// Returns [`FrameError::Encode`] when serialisation fails.
pub fn encode_line(message: &OutboundMessage) -> Result<Vec<u8>, FrameError> {
    let mut line = serde_json::to_vec(message).map_err(FrameError::Encode)?;
    line.push(b'\n');
    Ok(line)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_event_and_payload() {
        let message = decode_line(b"{\"event\":\"greet\",\"data\":{\"name\":\"Ada\"}}\n")
            .expect("decode")
            .expect("non-blank line");
        assert_eq!(message, InboundMessage::new("greet", json!({"name": "Ada"})));
    }

    #[test]
    fn absent_data_decodes_as_null() {
        let message = decode_line(b"{\"event\":\"ping\"}\r\n")
            .expect("decode")
            .expect("non-blank line");
        assert_eq!(message.data, Value::Null);
    }

    #[rstest]
    #[case(b"\n".as_slice())]
    #[case(b"   \r\n".as_slice())]
    fn blank_lines_are_skipped(#[case] line: &[u8]) {
        assert!(decode_line(line).expect("blank line").is_none());
    }

    #[rstest]
    #[case(b"not json".as_slice())]
    #[case(b"[1, 2]".as_slice())]
    #[case(b"{\"event\": 7}".as_slice())]
    fn rejects_malformed_lines(#[case] line: &[u8]) {
        let error = decode_line(line).expect_err("malformed line");
        assert!(matches!(error, FrameError::Malformed { .. }));
        assert!(error.is_recoverable());
    }

    #[test]
    fn rejects_objects_without_event() {
        let error = decode_line(b"{\"data\": 1}").expect_err("missing event");
        assert!(matches!(error, FrameError::MissingEvent));
    }

    #[test]
    fn encodes_newline_terminated_objects() {
        let line = encode_line(&OutboundMessage::new("greet:reply", json!("hi")))
            .expect("encode");
        assert_eq!(line, b"{\"event\":\"greet:reply\",\"data\":\"hi\"}\n");
    }
}
