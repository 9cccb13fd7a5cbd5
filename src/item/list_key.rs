//! Composite sort keys for list elements.
//!
//! A list element's sort key combines its value with the index it was
//! allocated, so the same value pushed twice becomes two distinct items.
//!
//! Format (version `v1`):
//!
//! ```text
//! v1:{tag}{base64(payload)}|{index}
//! ```
//!
//! `tag` is `s`, `i`, `f` or `b` for string, integer, float and bytes. The
//! standard base64 alphabet never contains `|`, so everything before the last
//! `|` is the value prefix shared by all elements equal to that value, and the
//! encoding is reversible.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::{Error, Result};
use crate::value::Value;

/// Current encoding version marker.
pub const VERSION: &str = "v1";

const INDEX_SEPARATOR: char = '|';

/// Encode `(value, index)` into a sort key.
pub fn encode(value: &Value, index: i64) -> String {
    format!("{}{}", value_prefix(value), index)
}

/// The part of the sort key determined by the value alone, including the
/// trailing separator. Every element equal to `value` begins with it.
pub fn value_prefix(value: &Value) -> String {
    format!("{}{}", prefix(value), INDEX_SEPARATOR)
}

fn prefix(value: &Value) -> String {
    let (tag, payload): (char, Vec<u8>) = match value {
        Value::String(s) => ('s', s.as_bytes().to_vec()),
        Value::Integer(i) => ('i', i.to_string().into_bytes()),
        Value::Float(f) => ('f', f.to_string().into_bytes()),
        Value::Bytes(b) => ('b', b.clone()),
    };
    format!("{VERSION}:{tag}{}", STANDARD.encode(payload))
}

/// Decode a sort key back into `(value, index)`.
pub fn decode(sort_key: &str) -> Result<(Value, i64)> {
    let malformed = || Error::Decode(format!("malformed list key: {sort_key:?}"));

    let body = sort_key
        .strip_prefix(VERSION)
        .and_then(|rest| rest.strip_prefix(':'))
        .ok_or_else(malformed)?;
    let (encoded, index) = body.rsplit_once(INDEX_SEPARATOR).ok_or_else(malformed)?;
    let index = index.parse::<i64>().map_err(|_| malformed())?;

    let mut chars = encoded.chars();
    let tag = chars.next().ok_or_else(malformed)?;
    let payload = STANDARD
        .decode(chars.as_str())
        .map_err(|_| malformed())?;

    let value = match tag {
        'b' => Value::Bytes(payload),
        's' | 'i' | 'f' => {
            let text = String::from_utf8(payload).map_err(|_| malformed())?;
            match tag {
                's' => Value::String(text),
                'i' => Value::Integer(text.parse().map_err(|_| malformed())?),
                _ => Value::Float(text.parse().map_err(|_| malformed())?),
            }
        }
        _ => return Err(malformed()),
    };

    Ok((value, index))
}
