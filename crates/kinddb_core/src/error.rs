//! Error types for the mapping layer and datastore.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by keys, models, queries and the datastore.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] kinddb_storage::StorageError),

    /// Record codec error.
    #[error("codec error: {0}")]
    Codec(#[from] kinddb_codec::CodecError),

    /// A property value failed validation.
    #[error("bad value for property {property}: {message}")]
    BadValue {
        /// Property being assigned or checked.
        property: String,
        /// What was wrong.
        message: String,
    },

    /// An argument to a key, query or allocation call was invalid.
    #[error("bad argument: {message}")]
    BadArgument {
        /// What was wrong.
        message: String,
    },

    /// The model has no property with this name.
    #[error("model {kind} has no property {name}")]
    UnknownProperty {
        /// Model kind.
        kind: String,
        /// Requested property.
        name: String,
    },

    /// No model schema is registered for a stored kind.
    #[error("no model registered for kind {kind}")]
    UnknownKind {
        /// Kind name.
        kind: String,
    },

    /// A key or entity belongs to a different kind than expected.
    #[error("expected kind {expected}, got {actual}")]
    KindMismatch {
        /// Kind the caller asked for.
        expected: String,
        /// Kind actually found.
        actual: String,
    },

    /// Encoded entity exceeds the configured size limit.
    #[error("entity of {size} bytes exceeds limit of {limit} bytes")]
    EntityTooLarge {
        /// Encoded size.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    /// Journal contents are damaged.
    #[error("journal corruption at offset {offset}: {message}")]
    JournalCorruption {
        /// Byte offset of the bad record.
        offset: u64,
        /// What was wrong.
        message: String,
    },

    /// A model hook refused the operation.
    #[error("hook rejected operation: {message}")]
    HookRejected {
        /// Reason given by the hook.
        message: String,
    },
}

impl CoreError {
    /// Creates a bad value error.
    pub fn bad_value(property: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BadValue {
            property: property.into(),
            message: message.into(),
        }
    }

    /// Creates a bad argument error.
    pub fn bad_argument(message: impl Into<String>) -> Self {
        Self::BadArgument {
            message: message.into(),
        }
    }

    /// Creates an unknown property error.
    pub fn unknown_property(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::UnknownProperty {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Creates a journal corruption error.
    pub fn journal_corruption(offset: u64, message: impl Into<String>) -> Self {
        Self::JournalCorruption {
            offset,
            message: message.into(),
        }
    }

    /// Creates a hook rejection error.
    pub fn hook_rejected(message: impl Into<String>) -> Self {
        Self::HookRejected {
            message: message.into(),
        }
    }
}
