//! Canonical CBOR encoder.

use crate::value::{integer_argument, Value};

/// Encodes a value to canonical CBOR.
///
/// Output is deterministic: shortest integer heads, definite lengths and
/// map keys sorted by their encoded bytes (length first).
pub fn to_canonical_cbor(value: &Value) -> Vec<u8> {
    let mut encoder = CanonicalEncoder::new();
    encoder.encode(value);
    encoder.into_bytes()
}

/// Streaming canonical encoder.
#[derive(Debug, Default)]
pub struct CanonicalEncoder {
    buffer: Vec<u8>,
}

impl CanonicalEncoder {
    /// Creates an empty encoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one value.
    pub fn encode(&mut self, value: &Value) {
        match value {
            Value::Null => self.buffer.push(0xf6),
            Value::Bool(false) => self.buffer.push(0xf4),
            Value::Bool(true) => self.buffer.push(0xf5),
            Value::Integer(n) => {
                let major = if *n >= 0 { 0 } else { 1 };
                self.head(major, integer_argument(*n));
            }
            Value::Bytes(b) => {
                self.head(2, b.len() as u64);
                self.buffer.extend_from_slice(b);
            }
            Value::Text(s) => {
                self.head(3, s.len() as u64);
                self.buffer.extend_from_slice(s.as_bytes());
            }
            Value::Array(items) => {
                self.head(4, items.len() as u64);
                for item in items {
                    self.encode(item);
                }
            }
            Value::Map(pairs) => self.encode_map(pairs),
        }
    }

    /// Returns the bytes written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the encoder.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    #[allow(clippy::cast_possible_truncation)]
    fn head(&mut self, major: u8, arg: u64) {
        let mt = major << 5;
        if arg < 24 {
            self.buffer.push(mt | arg as u8);
        } else if arg <= 0xFF {
            self.buffer.extend_from_slice(&[mt | 24, arg as u8]);
        } else if arg <= 0xFFFF {
            self.buffer.push(mt | 25);
            self.buffer.extend_from_slice(&(arg as u16).to_be_bytes());
        } else if arg <= 0xFFFF_FFFF {
            self.buffer.push(mt | 26);
            self.buffer.extend_from_slice(&(arg as u32).to_be_bytes());
        } else {
            self.buffer.push(mt | 27);
            self.buffer.extend_from_slice(&arg.to_be_bytes());
        }
    }

    fn encode_map(&mut self, pairs: &[(Value, Value)]) {
        let mut entries: Vec<_> = pairs
            .iter()
            .map(|(key, value)| (to_canonical_cbor(key), value))
            .collect();
        entries.sort_by(|a, b| a.0.len().cmp(&b.0.len()).then_with(|| a.0.cmp(&b.0)));

        self.head(5, entries.len() as u64);
        for (key_bytes, value) in entries {
            self.buffer.extend_from_slice(&key_bytes);
            self.encode(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_heads_are_shortest() {
        assert_eq!(to_canonical_cbor(&Value::Integer(23)), [0x17]);
        assert_eq!(to_canonical_cbor(&Value::Integer(24)), [0x18, 24]);
        assert_eq!(
            to_canonical_cbor(&Value::Integer(1000)),
            [0x19, 0x03, 0xe8]
        );
        assert_eq!(to_canonical_cbor(&Value::Integer(-1)), [0x20]);
        assert_eq!(
            to_canonical_cbor(&Value::Integer(-100)),
            [0x38, 99]
        );
    }

    #[test]
    fn key_path_encoding() {
        let path = Value::Array(vec![Value::from("Account"), Value::Integer(2)]);
        let bytes = to_canonical_cbor(&path);
        assert_eq!(bytes[0], 0x82);
        assert_eq!(bytes[1], 0x67);
        assert_eq!(&bytes[2..9], b"Account");
        assert_eq!(bytes[9], 0x02);
    }

    #[test]
    fn map_order_is_independent_of_insertion() {
        let a = Value::Map(vec![
            (Value::from("userid"), Value::Integer(1)),
            (Value::from("email"), Value::from("x")),
        ]);
        let b = Value::Map(vec![
            (Value::from("email"), Value::from("x")),
            (Value::from("userid"), Value::Integer(1)),
        ]);
        assert_eq!(to_canonical_cbor(&a), to_canonical_cbor(&b));
    }
}
