//! Declarative structural schemas over JSON values.

use std::collections::BTreeMap;

use serde_json::{Map, Number, Value};

use super::{Schema, ValidationFailure, ValidationIssue};

const MISSING: &str = "missing";

/// Structural contract for a JSON value.
///
/// ```
/// use serde_json::json;
/// use tsocket::schema::{Schema, Shape};
///
/// let greet = Shape::object([("name", Shape::string())]);
/// assert!(greet.validate(&json!({"name": "Ada"})).is_ok());
/// assert!(greet.validate(&json!({"name": 42})).is_err());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// Accepts any value, including an absent one.
    Any,
    /// JSON `null`.
    Null,
    /// `true` or `false`.
    Bool,
    /// Any JSON number.
    Number,
    /// A number without a fractional part; `3.0` counts.
    Integer,
    /// A JSON string.
    String,
    /// Exactly this value.
    Literal(Value),
    /// An array whose every element matches the inner shape.
    Array(Box<Shape>),
    /// An object with declared fields.
    Object(ObjectShape),
    /// The inner shape, `null`, or an absent field.
    Optional(Box<Shape>),
    /// At least one of the listed shapes.
    OneOf(Vec<Shape>),
}

/// Field declarations for [`Shape::Object`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectShape {
    fields: BTreeMap<String, Shape>,
    strict: bool,
}

impl ObjectShape {
    /// Declared fields keyed by name.
    #[must_use]
    pub const fn fields(&self) -> &BTreeMap<String, Shape> {
        &self.fields
    }

    /// Whether undeclared fields are rejected.
    #[must_use]
    pub const fn is_strict(&self) -> bool {
        self.strict
    }
}

impl Shape {
    /// Accepts any string.
    #[must_use]
    pub const fn string() -> Self {
        Self::String
    }

    /// Accepts any number.
    #[must_use]
    pub const fn number() -> Self {
        Self::Number
    }

    /// Accepts whole numbers.
    #[must_use]
    pub const fn integer() -> Self {
        Self::Integer
    }

    /// Accepts booleans.
    #[must_use]
    pub const fn boolean() -> Self {
        Self::Bool
    }

    /// Accepts exactly `value`.
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// Accepts arrays of `item`.
    #[must_use]
    pub fn array(item: Self) -> Self {
        Self::Array(Box::new(item))
    }

    /// Accepts objects carrying the listed fields; extra fields are ignored.
    pub fn object<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Self)>,
        K: Into<String>,
    {
        Self::Object(ObjectShape {
            fields: collect_fields(fields),
            strict: false,
        })
    }

    /// Accepts objects carrying exactly the listed fields.
    pub fn strict_object<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Self)>,
        K: Into<String>,
    {
        Self::Object(ObjectShape {
            fields: collect_fields(fields),
            strict: true,
        })
    }

    /// Accepts any of `shapes`.
    #[must_use]
    pub const fn one_of(shapes: Vec<Self>) -> Self {
        Self::OneOf(shapes)
    }

    /// Makes the shape accept `null` and absent fields.
    #[must_use]
    pub fn optional(self) -> Self {
        Self::Optional(Box::new(self))
    }

    /// Human-readable description used in [`ValidationIssue::expected`].
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Any => "any value".to_owned(),
            Self::Null => "null".to_owned(),
            Self::Bool => "boolean".to_owned(),
            Self::Number => "number".to_owned(),
            Self::Integer => "integer".to_owned(),
            Self::String => "string".to_owned(),
            Self::Literal(value) => format!("literal {value}"),
            Self::Array(item) => format!("array of {}", item.describe()),
            Self::Object(_) => "object".to_owned(),
            Self::Optional(inner) => format!("{} or null", inner.describe()),
            Self::OneOf(shapes) => shapes
                .iter()
                .map(Self::describe)
                .collect::<Vec<_>>()
                .join(" | "),
        }
    }

    fn check(&self, value: Option<&Value>, path: &str, issues: &mut Vec<ValidationIssue>) {
        match (self, value) {
            (Self::Any, _) => {}
            (Self::Optional(_), None | Some(Value::Null)) => {}
            (Self::Optional(inner), present) => inner.check(present, path, issues),
            (_, None) => issues.push(ValidationIssue::new(path, self.describe(), MISSING)),
            (shape, Some(value)) => shape.check_present(value, path, issues),
        }
    }

    fn check_present(&self, value: &Value, path: &str, issues: &mut Vec<ValidationIssue>) {
        let accepted = match (self, value) {
            (Self::Null, Value::Null)
            | (Self::Bool, Value::Bool(_))
            | (Self::Number, Value::Number(_))
            | (Self::String, Value::String(_)) => true,
            (Self::Integer, Value::Number(number)) => is_whole(number),
            (Self::Literal(expected), actual) => expected == actual,
            (Self::Array(item), Value::Array(elements)) => {
                for (index, element) in elements.iter().enumerate() {
                    item.check(Some(element), &format!("{path}[{index}]"), issues);
                }
                true
            }
            (Self::Object(object), Value::Object(map)) => {
                object.check(map, path, issues);
                true
            }
            (Self::OneOf(shapes), value) => shapes.iter().any(|shape| {
                let mut scratch = Vec::new();
                shape.check(Some(value), path, &mut scratch);
                scratch.is_empty()
            }),
            _ => false,
        };

        if !accepted {
            issues.push(ValidationIssue::new(path, self.describe(), kind_of(value)));
        }
    }
}

impl ObjectShape {
    fn check(&self, map: &Map<String, Value>, path: &str, issues: &mut Vec<ValidationIssue>) {
        for (name, shape) in &self.fields {
            shape.check(map.get(name), &format!("{path}.{name}"), issues);
        }
        if self.strict {
            for (name, value) in map {
                if !self.fields.contains_key(name) {
                    issues.push(ValidationIssue::new(
                        format!("{path}.{name}"),
                        "no such field",
                        kind_of(value),
                    ));
                }
            }
        }
    }
}

impl Schema for Shape {
    type Output = Value;

    fn validate(&self, raw: &Value) -> Result<Value, ValidationFailure> {
        let mut issues = Vec::new();
        self.check(Some(raw), "$", &mut issues);
        if issues.is_empty() {
            Ok(raw.clone())
        } else {
            Err(ValidationFailure::new(issues))
        }
    }
}

/// JSON type name of `value`.
pub(crate) const fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn collect_fields<I, K>(fields: I) -> BTreeMap<String, Shape>
where
    I: IntoIterator<Item = (K, Shape)>,
    K: Into<String>,
{
    fields
        .into_iter()
        .map(|(name, shape)| (name.into(), shape))
        .collect()
}

fn is_whole(number: &Number) -> bool {
    number.is_i64()
        || number.is_u64()
        || number
            .as_f64()
            .is_some_and(|value| value.is_finite() && value.fract() == 0.0)
}
