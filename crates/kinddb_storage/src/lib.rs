//! # KindDB Storage
//!
//! Append-only byte stores that hold the KindDB journal.
//!
//! A backend knows nothing about journal records, entities or keys: it
//! reads, appends, flushes and truncates bytes. The datastore owns the
//! record format on top.
//!
//! ```rust
//! use kinddb_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! backend.append(b"record").unwrap();
//! assert_eq!(backend.read_all().unwrap(), b"record");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
