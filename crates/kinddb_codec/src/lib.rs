//! # KindDB Codec
//!
//! Canonical CBOR for KindDB entity records, journal payloads and
//! serialized keys.
//!
//! The same logical value always encodes to the same bytes, which is what
//! makes a serialized key usable as a stable, comparable identifier.
//!
//! ## Rules
//!
//! - Map keys sorted by encoded bytes, shorter first
//! - Integers use the shortest head
//! - No floats, no indefinite lengths, no tags
//!
//! ```
//! use kinddb_codec::{from_cbor, to_canonical_cbor, Value};
//!
//! let path = Value::Array(vec![Value::from("Account"), Value::Integer(7)]);
//! let bytes = to_canonical_cbor(&path);
//! assert_eq!(from_cbor(&bytes).unwrap(), path);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod value;

pub use decoder::{from_cbor, CanonicalDecoder, MAX_DEPTH};
pub use encoder::{to_canonical_cbor, CanonicalEncoder};
pub use error::{CodecError, CodecResult};
pub use value::Value;

/// Types that map to a canonical record value.
pub trait Encode {
    /// Converts to a record value.
    fn to_value(&self) -> Value;

    /// Encodes to canonical CBOR bytes.
    fn encode(&self) -> Vec<u8> {
        to_canonical_cbor(&self.to_value())
    }
}

/// Types that can be rebuilt from a record value.
pub trait Decode: Sized {
    /// Rebuilds from a record value.
    fn from_value(value: &Value) -> CodecResult<Self>;

    /// Decodes from canonical CBOR bytes.
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        Self::from_value(&from_cbor(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Integer),
            "[a-zA-Z0-9@._-]{0,24}".prop_map(Value::Text),
            prop::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
        ]
    }

    fn record() -> impl Strategy<Value = Value> {
        leaf().prop_recursive(3, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,8}", inner, 0..6)
                    .prop_map(|m| Value::text_map(m)),
            ]
        })
    }

    proptest! {
        #[test]
        fn canonical_bytes_decode_to_same_value(value in record()) {
            let bytes = to_canonical_cbor(&value);
            prop_assert_eq!(from_cbor(&bytes).unwrap(), value);
        }

        #[test]
        fn reencoding_is_stable(value in record()) {
            let first = to_canonical_cbor(&value);
            let second = to_canonical_cbor(&from_cbor(&first).unwrap());
            prop_assert_eq!(first, second);
        }
    }
}
