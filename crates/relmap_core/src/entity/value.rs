//! Dynamic field values.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A scalar or list value held by an entity field.
///
/// `Null` represents an unset field. Integers and floats compare with each
/// other numerically; every other cross-type comparison is undefined.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Unset value.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Text string.
    Text(String),
    /// List of values (used by multi-valued fields).
    List(Vec<Value>),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as an integer, if it is one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a float. Integers are widened.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Get this value as text, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as a list, if it is one.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Short name of the value's type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::List(_) => "list",
        }
    }

    /// Compares two values, returning `None` when they are not comparable.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                self.as_float()?.partial_cmp(&other.as_float()?)
            }
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Equality with numeric widening (`Int(1)` equals `Float(1.0)`).
    pub fn loosely_equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(_), Value::Float(_)) | (Value::Float(_), Value::Int(_)) => {
                self.compare(other) == Some(Ordering::Equal)
            }
            _ => self == other,
        }
    }

    /// Converts into a typed value.
    pub fn into_typed<T: FromValue>(self) -> CoreResult<T> {
        T::from_value(self)
    }
}

/// Renders the value as plain text. `Null` renders as the empty string.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Text(s.clone())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

/// Conversion from a dynamic [`Value`] into a field's native type.
pub trait FromValue: Sized {
    /// Performs the conversion.
    fn from_value(value: Value) -> CoreResult<Self>;
}

fn mismatch(expected: &'static str, found: &Value) -> CoreError {
    CoreError::TypeMismatch {
        expected,
        found: found.type_name(),
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> CoreResult<Self> {
        Ok(value)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> CoreResult<Self> {
        value.as_bool().ok_or_else(|| mismatch("bool", &value))
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> CoreResult<Self> {
        value.as_int().ok_or_else(|| mismatch("int", &value))
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> CoreResult<Self> {
        value.as_float().ok_or_else(|| mismatch("float", &value))
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> CoreResult<Self> {
        match value {
            Value::Text(s) => Ok(s),
            other => Err(mismatch("text", &other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> CoreResult<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> CoreResult<Self> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(mismatch("list", &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_displays_as_empty() {
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::from("x").to_string(), "x");
        assert_eq!(Value::from(vec![1i64, 2]).to_string(), "[1, 2]");
    }

    #[test]
    fn numeric_comparison_widens() {
        assert_eq!(Value::Int(1).compare(&Value::Float(1.5)), Some(Ordering::Less));
        assert!(Value::Int(2).loosely_equals(&Value::Float(2.0)));
        assert_eq!(Value::Int(1).compare(&Value::from("1")), None);
    }

    #[test]
    fn option_conversions() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        let typed: Option<i64> = Value::Null.into_typed().unwrap();
        assert_eq!(typed, None);
        let typed: Option<String> = Value::from("a").into_typed().unwrap();
        assert_eq!(typed.as_deref(), Some("a"));
    }

    #[test]
    fn mismatched_conversion_fails() {
        let result: CoreResult<i64> = Value::from("one").into_typed();
        assert!(matches!(
            result,
            Err(CoreError::TypeMismatch {
                expected: "int",
                found: "text"
            })
        ));
    }

    #[test]
    fn untagged_json_shape() {
        let value = Value::from(vec![Value::Int(1), Value::Null, Value::from("a")]);
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"[1,null,"a"]"#);
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }
}
