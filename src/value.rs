//! Stored values.
//!
//! Every value written by a command is one of four shapes. Numbers travel
//! over the wire as decimal strings, so an integral float read back from the
//! store decodes as [`Value::Integer`]; use [`Value::as_f64`] when either is
//! acceptable.

use std::fmt;

use crate::error::{Error, Result};

/// A value held by a hash field, list element or counter.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Bytes(Vec<u8>),
}

impl Value {
    /// The string payload, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The integer payload. Floats are truncated toward zero.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Float(f) if f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    /// The numeric payload as a float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// The byte payload, if this is a byte string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }

    /// Decimal wire form of a numeric value.
    ///
    /// Floats use the shortest representation that reads back to the same
    /// bits; non-finite floats cannot be stored.
    pub fn number_string(&self) -> Result<String> {
        match self {
            Value::Integer(i) => Ok(i.to_string()),
            Value::Float(f) if f.is_finite() => Ok(format_float(*f)),
            Value::Float(f) => Err(Error::UnsupportedValue(format!(
                "non-finite number {f}"
            ))),
            other => Err(Error::UnsupportedValue(format!(
                "{} is not a number",
                other.type_name()
            ))),
        }
    }

    /// Parse the decimal wire form of a number.
    pub fn parse_number(text: &str) -> Result<Value> {
        if let Ok(i) = text.parse::<i64>() {
            return Ok(Value::Integer(i));
        }
        text.parse::<f64>()
            .map(Value::Float)
            .map_err(|_| Error::Decode(format!("invalid number: {text:?}")))
    }

    /// The value as it reads back after a trip through the store, where an
    /// integral float decodes as an integer.
    pub fn normalized(self) -> Value {
        match self {
            Value::Float(f) if f.is_finite() => {
                Value::parse_number(&format_float(f)).unwrap_or(Value::Float(f))
            }
            other => other,
        }
    }

    /// Numeric addition used by atomic counters.
    ///
    /// Integer plus integer stays integral (erroring on overflow); anything
    /// involving a float yields a float.
    pub fn checked_add(&self, delta: &Value) -> Result<Value> {
        match (self, delta) {
            (Value::Integer(a), Value::Integer(b)) => a
                .checked_add(*b)
                .map(Value::Integer)
                .ok_or_else(|| Error::InvalidArgument("increment would overflow".into())),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => Ok(Value::Float(a + b)),
                _ => Err(Error::InvalidArgument(format!(
                    "cannot add {} to {}",
                    b.type_name(),
                    a.type_name()
                ))),
            },
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Bytes(_) => "bytes",
        }
    }
}

fn format_float(f: f64) -> String {
    if f == 0.0 {
        // Collapse -0.0
        return "0".to_string();
    }
    format!("{f}")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

/// Dynamically typed input (for example decoded JSON) is accepted only when
/// it maps onto one of the four stored shapes.
impl TryFrom<serde_json::Value> for Value {
    type Error = Error;

    fn try_from(json: serde_json::Value) -> Result<Self> {
        match json {
            serde_json::Value::String(s) => Ok(Value::String(s)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::Integer(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(Value::Float(f))
                } else {
                    Err(Error::UnsupportedValue(format!("number out of range: {n}")))
                }
            }
            other => Err(Error::UnsupportedValue(format!(
                "JSON {} cannot be stored",
                json_type_name(&other)
            ))),
        }
    }
}

fn json_type_name(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
