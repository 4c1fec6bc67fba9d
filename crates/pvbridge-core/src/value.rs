//! Process variable values.

use crate::error::{DomainError, DomainResult};
use serde::Serialize;
use serde_json::Value;

/// The value carried by a process variable.
///
/// A tagged union over the value shapes the control system produces:
/// integer or floating-point scalars, strings, homogeneous numeric arrays
/// and string arrays. Serializes untagged, i.e. as the bare JSON value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PvValue {
    Int(i64),
    Double(f64),
    Text(String),
    IntArray(Vec<i64>),
    DoubleArray(Vec<f64>),
    TextArray(Vec<String>),
}

impl PvValue {
    /// Converts a JSON value received from a client into a `PvValue`.
    ///
    /// Booleans map to `0`/`1`. Arrays must be homogeneous: all strings, or
    /// all numbers (integers only yield an integer array, any fraction yields
    /// a double array). An empty array becomes an empty double array.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnsupportedValue` for `null`, objects, nested
    /// or mixed arrays.
    pub fn from_json(value: &Value) -> DomainResult<Self> {
        match value {
            Value::Bool(b) => Ok(Self::Int(i64::from(*b))),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(Self::Int(i)),
                None => n
                    .as_f64()
                    .map(Self::Double)
                    .ok_or_else(|| DomainError::unsupported(format!("number {n}"))),
            },
            Value::String(s) => Ok(Self::Text(s.clone())),
            Value::Array(items) => Self::array_from_json(items),
            Value::Null => Err(DomainError::unsupported("null")),
            Value::Object(_) => Err(DomainError::unsupported("object")),
        }
    }

    fn array_from_json(items: &[Value]) -> DomainResult<Self> {
        if items.is_empty() {
            return Ok(Self::DoubleArray(Vec::new()));
        }

        if items.iter().all(Value::is_string) {
            let strings = items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            return Ok(Self::TextArray(strings));
        }

        if !items.iter().all(Value::is_number) {
            return Err(DomainError::unsupported("mixed or nested array"));
        }

        let ints: Option<Vec<i64>> = items.iter().map(Value::as_i64).collect();
        if let Some(ints) = ints {
            return Ok(Self::IntArray(ints));
        }

        let doubles: Option<Vec<f64>> = items.iter().map(Value::as_f64).collect();
        doubles
            .map(Self::DoubleArray)
            .ok_or_else(|| DomainError::unsupported("array element out of range"))
    }
}

impl From<f64> for PvValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<i64> for PvValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for PvValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}
