//! # KindDB Testkit
//!
//! Test utilities for KindDB.
//!
//! This crate provides:
//! - Datastore fixtures, in memory or backed by a temporary journal file
//! - A populated warehouse with an export bucket
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use kinddb_testkit::prelude::*;
//!
//! with_temp_datastore(|ds| {
//!     assert!(ds.is_empty());
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
