//! Test fixtures and datastore helpers.
//!
//! Provides convenience functions for setting up test datastores
//! and a populated warehouse for export tests.

use kinddb_core::Datastore;
use kinddb_warehouse::{Field, FieldType, TableReference, TableSchema, Warehouse};
use serde_json::json;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A test datastore with automatic cleanup.
pub struct TestDatastore {
    /// The datastore instance.
    pub ds: Datastore,
    path: Option<PathBuf>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestDatastore {
    /// Creates a new in-memory test datastore.
    pub fn memory() -> Self {
        Self {
            ds: Datastore::open_in_memory().expect("Failed to open in-memory datastore"),
            path: None,
            _temp_dir: None,
        }
    }

    /// Creates a new datastore journaled to a file in a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("journal.kdb");
        let ds = Datastore::open(&path).expect("Failed to open file datastore");
        Self {
            ds,
            path: Some(path),
            _temp_dir: Some(temp_dir),
        }
    }

    /// Journal path if file-based, None if in-memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Closes and reopens a file-based datastore from its journal.
    ///
    /// Schemas and hooks must be registered again on the new instance.
    pub fn reopen(self) -> Self {
        let path = self.path.expect("Only file datastores can be reopened");
        drop(self.ds);
        Self {
            ds: Datastore::open(&path).expect("Failed to reopen datastore"),
            path: Some(path),
            _temp_dir: self._temp_dir,
        }
    }
}

impl std::ops::Deref for TestDatastore {
    type Target = Datastore;

    fn deref(&self) -> &Self::Target {
        &self.ds
    }
}

/// Runs a test with a temporary in-memory datastore.
pub fn with_temp_datastore<F, R>(f: F) -> R
where
    F: FnOnce(&Datastore) -> R,
{
    let test_ds = TestDatastore::memory();
    f(&test_ds.ds)
}

/// Runs a test with a temporary file-based datastore.
pub fn with_file_datastore<F, R>(f: F) -> R
where
    F: FnOnce(&Datastore, &Path) -> R,
{
    let test_ds = TestDatastore::file();
    let path = test_ds.path().expect("File datastore should have a path");
    f(&test_ds.ds, path)
}

/// Names used by [`sample_warehouse`].
pub mod constants {
    /// Project holding the sample dataset.
    pub const PROJECT_ID: &str = "kinddb-samples";
    /// Sample dataset.
    pub const DATASET_ID: &str = "test_dataset";
    /// Flat table of words, exportable in every format.
    pub const TABLE_ID: &str = "test_table";
    /// Table with a repeated column, not exportable as CSV.
    pub const NESTED_TABLE_ID: &str = "nested_table";
    /// Bucket created for export output.
    pub const BUCKET: &str = "kinddb-samples-output";
    /// Sharded destination in [`BUCKET`].
    pub const OUTPUT_URI: &str = "gs://kinddb-samples-output/output-*";
    /// Rows in [`TABLE_ID`].
    pub const TABLE_ROWS: usize = 12;
}

/// Creates a warehouse with the sample dataset, its two tables and the
/// output bucket.
pub fn sample_warehouse() -> Warehouse {
    use constants::*;

    let warehouse = Warehouse::new();
    warehouse.storage().create_bucket(BUCKET);
    warehouse
        .create_dataset(PROJECT_ID, DATASET_ID)
        .expect("Failed to create dataset");

    let table = TableReference::new(PROJECT_ID, DATASET_ID, TABLE_ID);
    let schema = TableSchema::new(vec![
        Field::required("word", FieldType::String),
        Field::required("word_count", FieldType::Integer),
        Field::nullable("corpus", FieldType::String),
        Field::nullable("frequency", FieldType::Float),
        Field::nullable("common", FieldType::Boolean),
    ])
    .expect("Invalid sample schema");
    warehouse
        .create_table(&table, schema)
        .expect("Failed to create table");
    let rows = (0..TABLE_ROWS).map(|i| {
        json!({
            "word": format!("word{i}"),
            "word_count": i * 3 + 1,
            "corpus": if i % 4 == 0 { json!(null) } else { json!("sonnets") },
            "frequency": (i as f64) / 8.0,
            "common": i % 2 == 0,
        })
        .as_object()
        .cloned()
        .expect("Row literal is an object")
    });
    warehouse
        .insert_rows(&table, rows)
        .expect("Failed to insert rows");

    let nested = TableReference::new(PROJECT_ID, DATASET_ID, NESTED_TABLE_ID);
    let schema = TableSchema::new(vec![
        Field::required("id", FieldType::Integer),
        Field::repeated("tags", FieldType::String),
    ])
    .expect("Invalid nested schema");
    warehouse
        .create_table(&nested, schema)
        .expect("Failed to create nested table");
    let rows = [json!({"id": 1, "tags": ["a", "b"]}), json!({"id": 2, "tags": []})]
        .into_iter()
        .map(|v| v.as_object().cloned().expect("Row literal is an object"));
    warehouse
        .insert_rows(&nested, rows)
        .expect("Failed to insert nested rows");

    warehouse
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_datastore() {
        let test_ds = TestDatastore::memory();
        assert!(test_ds.is_empty());
        assert!(test_ds.path().is_none());
    }

    #[test]
    fn test_file_datastore_reopens() {
        let test_ds = TestDatastore::file();
        let path = test_ds.path().map(Path::to_path_buf);
        let reopened = test_ds.reopen();
        assert_eq!(reopened.path().map(Path::to_path_buf), path);
    }

    #[test]
    fn test_sample_warehouse() {
        let warehouse = sample_warehouse();
        let table = warehouse
            .table(&TableReference::new(
                constants::PROJECT_ID,
                constants::DATASET_ID,
                constants::TABLE_ID,
            ))
            .unwrap();
        assert_eq!(table.rows.len(), constants::TABLE_ROWS);
        assert!(warehouse.storage().has_bucket(constants::BUCKET));
    }
}
