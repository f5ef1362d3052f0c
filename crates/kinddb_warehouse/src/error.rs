//! Error types for the warehouse emulator.

use std::time::Duration;
use thiserror::Error;

/// Result type for warehouse operations.
pub type WarehouseResult<T> = Result<T, WarehouseError>;

/// Errors raised by warehouse calls and the export helper.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// A project, dataset, table or job does not exist.
    #[error("not found: {resource}")]
    NotFound {
        /// Resource path.
        resource: String,
    },

    /// A dataset or table already exists.
    #[error("already exists: {resource}")]
    AlreadyExists {
        /// Resource path.
        resource: String,
    },

    /// A row does not fit the table schema.
    #[error("invalid row: {message}")]
    InvalidRow {
        /// What was wrong.
        message: String,
    },

    /// A request argument was invalid.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// What was wrong.
        message: String,
    },

    /// The service could not take the request right now; retrying may help.
    #[error("service unavailable: {message}")]
    Unavailable {
        /// What was wrong.
        message: String,
    },

    /// An export job finished with an error.
    #[error("job {job_id} failed: {reason}: {message}")]
    JobFailed {
        /// Failed job.
        job_id: String,
        /// Short machine-readable reason.
        reason: String,
        /// Human-readable message.
        message: String,
    },

    /// An export job did not finish in time.
    #[error("job {job_id} still running after {waited:?}")]
    Timeout {
        /// Unfinished job.
        job_id: String,
        /// Time spent waiting.
        waited: Duration,
    },

    /// JSON encoding error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Avro encoding or decoding error.
    #[error("avro error: {0}")]
    Avro(#[from] apache_avro::Error),
}

impl WarehouseError {
    /// Creates a not-found error.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Creates an invalid row error.
    pub fn invalid_row(message: impl Into<String>) -> Self {
        Self::InvalidRow {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}
