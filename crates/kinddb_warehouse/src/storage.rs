//! In-process object store for export destinations.

use crate::error::{WarehouseError, WarehouseResult};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// URI schemes accepted as export destinations.
pub const SCHEMES: [&str; 2] = ["gs", "mem"];

/// A parsed `scheme://bucket/object` destination.
///
/// The object name may contain one `*`, which sharded exports replace with a
/// 12-digit shard number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationUri {
    scheme: String,
    bucket: String,
    object: String,
}

impl DestinationUri {
    /// Parses and checks a destination URI.
    pub fn parse(uri: &str) -> WarehouseResult<Self> {
        let invalid = |message: &str| {
            WarehouseError::invalid_argument(format!("invalid destination {uri:?}: {message}"))
        };
        let (scheme, rest) = uri.split_once("://").ok_or_else(|| invalid("missing scheme"))?;
        if !SCHEMES.contains(&scheme) {
            return Err(invalid("unsupported scheme"));
        }
        let (bucket, object) = rest.split_once('/').ok_or_else(|| invalid("missing object"))?;
        if bucket.is_empty() {
            return Err(invalid("empty bucket"));
        }
        if object.is_empty() {
            return Err(invalid("empty object"));
        }
        if object.matches('*').count() > 1 {
            return Err(invalid("more than one wildcard"));
        }
        Ok(Self {
            scheme: scheme.to_string(),
            bucket: bucket.to_string(),
            object: object.to_string(),
        })
    }

    /// Bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Object name, wildcard included.
    pub fn object(&self) -> &str {
        &self.object
    }

    /// Whether the object name has a wildcard.
    pub fn is_sharded(&self) -> bool {
        self.object.contains('*')
    }

    /// URI of shard `n`. Without a wildcard this is the URI itself.
    pub fn shard(&self, n: usize) -> String {
        format!(
            "{}://{}/{}",
            self.scheme,
            self.bucket,
            self.object.replace('*', &format!("{n:012}"))
        )
    }
}

impl fmt::Display for DestinationUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.scheme, self.bucket, self.object)
    }
}

#[derive(Debug, Default)]
struct Objects {
    buckets: BTreeSet<String>,
    blobs: BTreeMap<String, Vec<u8>>,
}

/// Buckets of named byte blobs, shared between clones.
#[derive(Debug, Clone, Default)]
pub struct ObjectStore {
    inner: Arc<RwLock<Objects>>,
}

impl ObjectStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bucket. Creating an existing bucket is a no-op.
    pub fn create_bucket(&self, bucket: impl Into<String>) {
        self.inner.write().buckets.insert(bucket.into());
    }

    /// Whether a bucket exists.
    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.inner.read().buckets.contains(bucket)
    }

    /// Writes an object, replacing any previous content.
    pub fn put(&self, uri: &str, data: Vec<u8>) -> WarehouseResult<()> {
        let dest = DestinationUri::parse(uri)?;
        let mut inner = self.inner.write();
        if !inner.buckets.contains(dest.bucket()) {
            return Err(WarehouseError::not_found(format!("bucket {}", dest.bucket())));
        }
        inner.blobs.insert(uri.to_string(), data);
        Ok(())
    }

    /// Reads an object.
    pub fn get(&self, uri: &str) -> Option<Vec<u8>> {
        self.inner.read().blobs.get(uri).cloned()
    }

    /// URIs starting with `prefix`, in order.
    pub fn list(&self, prefix: &str) -> Vec<String> {
        self.inner
            .read()
            .blobs
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Removes an object, returning whether it existed.
    pub fn delete(&self, uri: &str) -> bool {
        self.inner.write().blobs.remove(uri).is_some()
    }
}
