//! Shape-checked deserialisation into concrete types.

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{Schema, Shape, ValidationFailure, ValidationIssue};

/// Schema that checks a [`Shape`] and then deserialises into `T`.
///
/// The shape produces field-level issues; deserialisation catches anything the
/// shape cannot express (numeric ranges, enum tags) and reports it at `$`.
pub struct Typed<T> {
    shape: Shape,
    _output: PhantomData<fn() -> T>,
}

impl<T> Typed<T>
where
    T: DeserializeOwned + Send + 'static,
{
    /// Checks `shape` before deserialising.
    #[must_use]
    pub const fn new(shape: Shape) -> Self {
        Self {
            shape,
            _output: PhantomData,
        }
    }

    /// Relies on deserialisation alone.
    #[must_use]
    pub const fn serde() -> Self {
        Self::new(Shape::Any)
    }

    /// Structural contract checked before deserialisation.
    #[must_use]
    pub const fn shape(&self) -> &Shape {
        &self.shape
    }
}

impl<T> fmt::Debug for Typed<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Typed")
            .field("shape", &self.shape)
            .field("output", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> Clone for Typed<T> {
    fn clone(&self) -> Self {
        Self {
            shape: self.shape.clone(),
            _output: PhantomData,
        }
    }
}

impl<T> Schema for Typed<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Output = T;

    fn validate(&self, raw: &Value) -> Result<T, ValidationFailure> {
        self.shape.validate(raw)?;
        T::deserialize(raw).map_err(|error| {
            ValidationFailure::single(
                ValidationIssue::new("$", std::any::type_name::<T>(), super::shape::kind_of(raw))
                    .with_message(error.to_string()),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Greet {
        name: String,
    }

    #[derive(Debug, Deserialize)]
    struct Percent {
        #[expect(dead_code, reason = "only deserialisation is exercised")]
        value: u8,
    }

    #[test]
    fn deserialises_accepted_payloads() {
        let schema = Typed::<Greet>::new(Shape::object([("name", Shape::string())]));
        let greet = schema
            .validate(&json!({"name": "Ada"}))
            .expect("valid greet");
        assert_eq!(greet, Greet { name: "Ada".into() });
    }

    #[test]
    fn shape_issues_take_precedence() {
        let schema = Typed::<Greet>::new(Shape::object([("name", Shape::string())]));
        let failure = schema
            .validate(&json!({"name": 42}))
            .expect_err("numeric name is rejected");
        assert_eq!(failure.issues()[0].path, "$.name");
        assert!(failure.issues()[0].message.is_none());
    }

    #[test]
    fn deserialisation_errors_carry_serde_detail() {
        let schema = Typed::<Percent>::serde();
        let failure = schema
            .validate(&json!({"value": 300}))
            .expect_err("300 does not fit in u8");
        let issue = &failure.issues()[0];
        assert_eq!(issue.path, "$");
        assert_eq!(issue.actual, "object");
        assert!(issue.message.as_deref().is_some_and(|m| m.contains("300")));
    }
}
