//! Dynamic record value.

use crate::error::{CodecError, CodecResult};
use std::cmp::Ordering;

/// A value that can appear in a stored record.
///
/// There is no float variant: every record is canonical CBOR, and the
/// canonical form used here has no floating point items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed 64-bit integer.
    Integer(i64),
    /// Byte string.
    Bytes(Vec<u8>),
    /// UTF-8 text.
    Text(String),
    /// Ordered list.
    Array(Vec<Value>),
    /// Key/value pairs, kept in canonical key order.
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// Builds a map, sorting keys into canonical order.
    pub fn map(mut pairs: Vec<(Value, Value)>) -> Self {
        pairs.sort_by(|a, b| a.0.cmp_canonical(&b.0));
        Value::Map(pairs)
    }

    /// Builds a map with text keys.
    pub fn text_map<K: Into<String>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::map(
            pairs
                .into_iter()
                .map(|(k, v)| (Value::Text(k.into()), v))
                .collect(),
        )
    }

    /// Orders two values the way their canonical encodings sort:
    /// major type first, then encoded length, then content.
    pub fn cmp_canonical(&self, other: &Self) -> Ordering {
        let by_type = self.major_type().cmp(&other.major_type());
        if by_type != Ordering::Equal {
            return by_type;
        }

        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Integer(a), Value::Integer(b)) => {
                // Same major type, so both share a sign.
                let (x, y) = (integer_argument(*a), integer_argument(*b));
                head_len(x).cmp(&head_len(y)).then(x.cmp(&y))
            }
            (Value::Bytes(a), Value::Bytes(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            (Value::Array(a), Value::Array(b)) => a.len().cmp(&b.len()).then_with(|| {
                a.iter()
                    .zip(b)
                    .map(|(x, y)| x.cmp_canonical(y))
                    .find(|o| *o != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            }),
            (Value::Map(a), Value::Map(b)) => a.len().cmp(&b.len()).then_with(|| {
                a.iter()
                    .zip(b)
                    .map(|((ak, av), (bk, bv))| ak.cmp_canonical(bk).then(av.cmp_canonical(bv)))
                    .find(|o| *o != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            }),
            // Null against null, or bool against null.
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(_), Value::Null) => Ordering::Less,
            (Value::Null, Value::Bool(_)) => Ordering::Greater,
            _ => Ordering::Equal,
        }
    }

    pub(crate) fn major_type(&self) -> u8 {
        match self {
            Value::Integer(n) if *n >= 0 => 0,
            Value::Integer(_) => 1,
            Value::Bytes(_) => 2,
            Value::Text(_) => 3,
            Value::Array(_) => 4,
            Value::Map(_) => 5,
            Value::Bool(_) | Value::Null => 7,
        }
    }

    /// Returns true for `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Boolean payload, if any.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer payload, if any.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Byte payload, if any.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Text payload, if any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Array items, if any.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Map entries, if any.
    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Looks up a text key in a map.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k.as_text() == Some(key))
            .map(|(_, v)| v)
    }

    /// Looks up a required text field of a map record.
    pub fn field(&self, key: &str) -> CodecResult<&Value> {
        self.get(key)
            .ok_or_else(|| CodecError::unexpected_shape(key, "present field"))
    }

    /// Reads a required text field of a map record.
    pub fn text_field(&self, key: &str) -> CodecResult<&str> {
        self.field(key)?
            .as_text()
            .ok_or_else(|| CodecError::unexpected_shape(key, "text"))
    }

    /// Reads a required array field of a map record.
    pub fn array_field(&self, key: &str) -> CodecResult<&[Value]> {
        self.field(key)?
            .as_array()
            .ok_or_else(|| CodecError::unexpected_shape(key, "array"))
    }
}

/// CBOR argument of an integer: `n` for non-negative, `-1 - n` otherwise.
#[allow(clippy::cast_sign_loss)]
pub(crate) fn integer_argument(n: i64) -> u64 {
    if n >= 0 {
        n as u64
    } else {
        (-1 - n) as u64
    }
}

/// Bytes used by an item head carrying `arg`.
pub(crate) fn head_len(arg: u64) -> usize {
    match arg {
        0..=23 => 1,
        24..=0xFF => 2,
        0x100..=0xFFFF => 3,
        0x1_0000..=0xFFFF_FFFF => 5,
        _ => 9,
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}
