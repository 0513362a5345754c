//! Failures handed to error handlers.

use std::fmt;

use serde::Serialize;

use crate::event::HandlerError;
use crate::schema::ValidationFailure;

/// Why an event could not be handled.
///
/// Serialises with a `kind` tag, so an error handler may return the envelope
/// itself:
///
/// ```json
/// {"kind": "validation", "event": "greet", "details": {"issues": [...]}}
/// ```
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureEnvelope {
    /// The payload did not satisfy the event's schema.
    Validation {
        event: String,
        details: ValidationFailure,
    },
    /// The handler returned an error or panicked.
    Handler { event: String, cause: HandlerError },
}

impl FailureEnvelope {
    /// Name of the event that failed.
    #[must_use]
    pub fn event(&self) -> &str {
        match self {
            Self::Validation { event, .. } | Self::Handler { event, .. } => event,
        }
    }

    /// Failure category.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::Validation { .. } => FailureKind::Validation,
            Self::Handler { .. } => FailureKind::Handler,
        }
    }

    /// Validation details, for validation failures.
    #[must_use]
    pub const fn validation(&self) -> Option<&ValidationFailure> {
        match self {
            Self::Validation { details, .. } => Some(details),
            Self::Handler { .. } => None,
        }
    }

    /// Handler error, for handler failures.
    #[must_use]
    pub const fn handler_error(&self) -> Option<&HandlerError> {
        match self {
            Self::Handler { cause, .. } => Some(cause),
            Self::Validation { .. } => None,
        }
    }
}

impl fmt::Display for FailureEnvelope {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation { event, details } => write!(formatter, "{event}: {details}"),
            Self::Handler { event, cause } => write!(formatter, "{event}: {cause}"),
        }
    }
}

/// Category of a [`FailureEnvelope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Schema rejection.
    Validation,
    /// Handler error or panic.
    Handler,
}

impl FailureKind {
    /// Lower-case label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Handler => "handler",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::schema::ValidationIssue;

    #[test]
    fn validation_envelopes_serialise_with_kind_tag() {
        let envelope = FailureEnvelope::Validation {
            event: "greet".into(),
            details: ValidationFailure::single(ValidationIssue::new("$.name", "string", "number")),
        };
        assert_eq!(
            serde_json::to_value(&envelope).expect("serialise"),
            json!({
                "kind": "validation",
                "event": "greet",
                "details": {"issues": [
                    {"path": "$.name", "expected": "string", "actual": "number"}
                ]}
            })
        );
    }

    #[test]
    fn handler_envelopes_expose_their_cause() {
        let envelope = FailureEnvelope::Handler {
            event: "greet".into(),
            cause: HandlerError::new("db down").with_code(503),
        };
        assert_eq!(envelope.kind(), FailureKind::Handler);
        assert_eq!(envelope.event(), "greet");
        assert_eq!(envelope.handler_error().and_then(HandlerError::code), Some(503));
        assert!(envelope.validation().is_none());
        assert_eq!(envelope.to_string(), "greet: db down");
    }
}
