//! Structured validation failures.

use std::fmt;

use serde::Serialize;

/// One mismatch between a payload and its schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    /// JSON path of the offending value, rooted at `$`.
    pub path: String,
    /// What the schema accepts at `path`.
    pub expected: String,
    /// What the payload held at `path`.
    pub actual: String,
    /// Extra detail from the validator, when it has any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ValidationIssue {
    /// Builds an issue without an extra message.
    pub fn new(
        path: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            expected: expected.into(),
            actual: actual.into(),
            message: None,
        }
    }

    /// Attaches validator detail to the issue.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{}: expected {}, found {}",
            self.path, self.expected, self.actual
        )?;
        if let Some(message) = &self.message {
            write!(formatter, " ({message})")?;
        }
        Ok(())
    }
}

/// Rejection produced by a [`Schema`](super::Schema).
///
/// Serialises as `{"issues": [...]}` so error handlers can forward it to the
/// client unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationFailure {
    issues: Vec<ValidationIssue>,
}

impl ValidationFailure {
    /// Builds a failure from the collected issues.
    #[must_use]
    pub const fn new(issues: Vec<ValidationIssue>) -> Self {
        Self { issues }
    }

    /// Builds a failure holding one issue.
    #[must_use]
    pub fn single(issue: ValidationIssue) -> Self {
        Self {
            issues: vec![issue],
        }
    }

    /// Every mismatch found, in document order.
    #[must_use]
    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    /// Consumes the failure, returning its issues.
    #[must_use]
    pub fn into_issues(self) -> Vec<ValidationIssue> {
        self.issues
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("input failed validation")?;
        for (index, issue) in self.issues.iter().enumerate() {
            let separator = if index == 0 { ": " } else { "; " };
            write!(formatter, "{separator}{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationFailure {}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn display_lists_every_issue() {
        let failure = ValidationFailure::new(vec![
            ValidationIssue::new("$.name", "string", "number"),
            ValidationIssue::new("$.age", "integer", "missing"),
        ]);
        assert_eq!(
            failure.to_string(),
            "input failed validation: $.name: expected string, found number; \
             $.age: expected integer, found missing"
        );
    }

    #[test]
    fn serialises_without_empty_messages() {
        let failure = ValidationFailure::single(ValidationIssue::new("$", "object", "string"));
        let encoded = serde_json::to_value(&failure).expect("serialise failure");
        assert_eq!(
            encoded,
            json!({"issues": [{"path": "$", "expected": "object", "actual": "string"}]})
        );
    }
}
