//! # KindDB Warehouse
//!
//! An in-process analytics warehouse used as the export target for KindDB
//! samples and tools. It holds datasets of typed tables and runs extract jobs
//! that write a table to an object store as CSV, newline-delimited JSON or
//! Avro.
//!
//! ```
//! use kinddb_warehouse::{export_table, ExportFormat, ExportRequest, Field, FieldType,
//!     TableReference, TableSchema, Warehouse};
//! use serde_json::json;
//!
//! let warehouse = Warehouse::new();
//! warehouse.storage().create_bucket("exports");
//! warehouse.create_dataset("demo", "shop").unwrap();
//! let table = TableReference::new("demo", "shop", "items");
//! warehouse
//!     .create_table(&table, TableSchema::new(vec![Field::required("sku", FieldType::String)]).unwrap())
//!     .unwrap();
//! warehouse
//!     .insert_rows(&table, json!({"sku": "A-1"}).as_object().cloned())
//!     .unwrap();
//!
//! let request = ExportRequest::new("gs://exports/items.json", "demo", "shop", "items")
//!     .format(ExportFormat::NewlineDelimitedJson);
//! let job = export_table(&warehouse, &request).unwrap();
//! assert_eq!(job.statistics.unwrap().rows_exported, 1);
//! ```

mod error;
mod export;
mod format;
mod job;
mod schema;
mod storage;
mod warehouse;
pub mod writer;

pub use error::{WarehouseError, WarehouseResult};
pub use export::{export_table, ExportRequest};
pub use format::ExportFormat;
pub use job::{
    ErrorProto, ExtractConfig, ExtractStatistics, Job, JobReference, JobState, JobStatus,
    TableReference,
};
pub use schema::{Field, FieldMode, FieldType, Row, TableSchema};
pub use storage::{DestinationUri, ObjectStore, SCHEMES};
pub use warehouse::{Table, Warehouse, DEFAULT_FINISHED_JOB_LIMIT};
