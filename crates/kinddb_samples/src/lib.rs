//! # KindDB Samples
//!
//! Short, self-contained uses of the KindDB APIs:
//!
//! - [`entities`]: models, keys, ancestor paths, expando and polymorphic
//!   models, hooks and id reservation on a [`kinddb_core::Datastore`]
//! - [`export`]: exporting a warehouse table to object storage

pub mod entities;
pub mod export;
