//! Input validation for inbound event payloads.
//!
//! A [`Schema`] turns a raw JSON payload into the typed value an event handler
//! consumes, or into a [`ValidationFailure`] describing every field that did
//! not match. Validation is synchronous and side-effect free; rejection is
//! always expressed through the `Err` variant.
//!
//! Two schema flavours ship with the crate:
//!
//! - [`Shape`], a declarative structural contract over JSON values whose
//!   output is the accepted [`serde_json::Value`].
//! - [`Typed`], which checks a [`Shape`] and then deserialises the payload
//!   into a concrete Rust type.
//!
//! Any other validator can be plugged in by implementing [`Schema`] directly
//! or by wrapping a closure with [`from_fn`].

mod failure;
mod shape;
mod typed;

use serde_json::Value;

pub use self::failure::{ValidationFailure, ValidationIssue};
pub use self::shape::{ObjectShape, Shape};
pub use self::typed::Typed;

/// Validation contract for an event's input.
pub trait Schema: Send + Sync + 'static {
    /// Value produced for the handler when validation succeeds.
    type Output: Send + 'static;

    /// Validates `raw`, returning the typed input or a structured failure.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationFailure`] when `raw` does not satisfy the schema.
    fn validate(&self, raw: &Value) -> Result<Self::Output, ValidationFailure>;
}

/// Runs `schema` against `raw`.
///
/// # Errors
///
/// Propagates the schema's [`ValidationFailure`].
pub fn validate<S: Schema>(schema: &S, raw: &Value) -> Result<S::Output, ValidationFailure> {
    schema.validate(raw)
}

/// Schema backed by a plain validation function.
#[derive(Debug, Clone, Copy)]
pub struct FnSchema<F>(F);

/// Wraps a validation function as a [`Schema`].
pub const fn from_fn<F, T>(validator: F) -> FnSchema<F>
where
    F: Fn(&Value) -> Result<T, ValidationFailure> + Send + Sync + 'static,
    T: Send + 'static,
{
    FnSchema(validator)
}

impl<F, T> Schema for FnSchema<F>
where
    F: Fn(&Value) -> Result<T, ValidationFailure> + Send + Sync + 'static,
    T: Send + 'static,
{
    type Output = T;

    fn validate(&self, raw: &Value) -> Result<T, ValidationFailure> {
        (self.0)(raw)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn function_schemas_delegate_to_the_closure() {
        let even = from_fn(|raw: &Value| match raw.as_i64() {
            Some(number) if number % 2 == 0 => Ok(number),
            _ => Err(ValidationFailure::single(ValidationIssue::new(
                "$",
                "even integer",
                raw.to_string(),
            ))),
        });

        assert_eq!(validate(&even, &json!(4)).ok(), Some(4));
        let failure = validate(&even, &json!(3)).expect_err("odd numbers are rejected");
        assert_eq!(failure.issues()[0].expected, "even integer");
    }
}
