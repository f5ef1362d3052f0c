//! Codec errors.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors raised while encoding or decoding records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Malformed or structurally invalid CBOR.
    #[error("invalid CBOR structure: {message}")]
    InvalidStructure {
        /// What was wrong.
        message: String,
    },

    /// Floats have no place in a stored record.
    #[error("float values are not supported")]
    FloatForbidden,

    /// Indefinite-length items are forbidden.
    #[error("indefinite-length items are forbidden")]
    IndefiniteLengthForbidden,

    /// Text was not valid UTF-8.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// Input ended in the middle of an item.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// Input continued after the top-level item.
    #[error("{count} trailing bytes after value")]
    TrailingBytes {
        /// Number of unread bytes.
        count: usize,
    },

    /// A length header claims more than the decoder accepts.
    #[error("length {claimed} exceeds limit {max_allowed}")]
    SizeLimitExceeded {
        /// Length found in the header.
        claimed: u64,
        /// Largest accepted length.
        max_allowed: u64,
    },

    /// Arrays and maps nest deeper than the decoder accepts.
    #[error("nesting exceeds depth {max}")]
    DepthExceeded {
        /// Deepest accepted nesting.
        max: usize,
    },

    /// Integer does not fit in an `i64`.
    #[error("integer overflow")]
    IntegerOverflow,

    /// CBOR item the record format does not use.
    #[error("unsupported CBOR type: {type_name}")]
    UnsupportedType {
        /// Name of the item.
        type_name: String,
    },

    /// A decoded value had the wrong shape for the record being read.
    #[error("unexpected shape for {field}: expected {expected}")]
    UnexpectedShape {
        /// Field being read.
        field: String,
        /// Shape that was expected.
        expected: &'static str,
    },
}

impl CodecError {
    /// Creates an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Creates an unsupported type error.
    pub fn unsupported_type(type_name: impl Into<String>) -> Self {
        Self::UnsupportedType {
            type_name: type_name.into(),
        }
    }

    /// Creates an unexpected shape error.
    pub fn unexpected_shape(field: impl Into<String>, expected: &'static str) -> Self {
        Self::UnexpectedShape {
            field: field.into(),
            expected,
        }
    }
}
