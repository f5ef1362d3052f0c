//! # KindDB Core
//!
//! Entity mapping layer and embedded datastore.
//!
//! This crate provides:
//! - Keys with parent paths and a URL-safe string form
//! - Model schemas with typed, repeated, computed and expando properties
//! - Polymorphic model hierarchies stored under one kind
//! - Per-kind hooks around put, get and delete
//! - Queries with ancestor, property filters and sort orders
//! - Id allocation and a CRC-checked journal replayed on open

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod allocator;
mod config;
mod datastore;
mod error;
mod hooks;
pub mod journal;
mod key;
mod model;
mod property;
mod query;
mod schema;

pub use allocator::IdAllocator;
pub use config::{Config, DEFAULT_MAX_ENTITY_BYTES};
pub use datastore::Datastore;
pub use error::{CoreError, CoreResult};
pub use hooks::ModelHooks;
pub use key::{Key, KeyId, PathElement, MAX_KEY_PART_BYTES};
pub use model::{Entity, Model, PropertyDescriptor};
pub use property::{ComputeFn, Property, PropertyType, PropertyValue, MAX_INDEXED_STRING_BYTES};
pub use query::{Direction, Filter, FilterOp, Order, PropertyRef, Query};
pub use schema::{ModelSchema, ModelSchemaBuilder, CLASS_PROPERTY};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
