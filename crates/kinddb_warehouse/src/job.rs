//! Export job resources.

use crate::error::{WarehouseError, WarehouseResult};
use crate::format::ExportFormat;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fully-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableReference {
    /// Owning project.
    pub project_id: String,
    /// Dataset within the project.
    pub dataset_id: String,
    /// Table within the dataset.
    pub table_id: String,
}

impl TableReference {
    /// Creates a table reference.
    pub fn new(
        project_id: impl Into<String>,
        dataset_id: impl Into<String>,
        table_id: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            dataset_id: dataset_id.into(),
            table_id: table_id.into(),
        }
    }
}

impl fmt::Display for TableReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}.{}", self.project_id, self.dataset_id, self.table_id)
    }
}

/// Names a job within a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReference {
    /// Project that owns the job.
    pub project_id: String,
    /// Unique job id.
    pub job_id: String,
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    /// Accepted, not started.
    Pending,
    /// Writing files.
    Running,
    /// Finished, successfully or not.
    Done,
}

/// Error attached to a finished job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorProto {
    /// Short machine-readable reason, such as `notFound` or `invalid`.
    pub reason: String,
    /// Human-readable message.
    pub message: String,
}

impl ErrorProto {
    /// Creates an error result.
    pub fn new(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            message: message.into(),
        }
    }
}

/// State and outcome of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    /// Lifecycle state.
    pub state: JobState,
    /// Set when a `Done` job failed.
    pub error_result: Option<ErrorProto>,
}

/// Extract job configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractConfig {
    /// Table to export.
    pub source_table: TableReference,
    /// Destination URIs; shards are spread across them in turn.
    pub destination_uris: Vec<String>,
    /// Output format.
    pub destination_format: ExportFormat,
    /// CSV column separator.
    pub field_delimiter: char,
    /// Whether CSV files start with a header line.
    pub print_header: bool,
    /// Rows per file when a destination has a wildcard.
    pub page_size: usize,
}

impl ExtractConfig {
    /// Default rows per sharded file.
    pub const DEFAULT_PAGE_SIZE: usize = 1000;

    /// Exports `source_table` to `destination_uri` as CSV.
    pub fn new(source_table: TableReference, destination_uri: impl Into<String>) -> Self {
        Self {
            source_table,
            destination_uris: vec![destination_uri.into()],
            destination_format: ExportFormat::Csv,
            field_delimiter: ',',
            print_header: true,
            page_size: Self::DEFAULT_PAGE_SIZE,
        }
    }

    /// Sets the output format.
    #[must_use]
    pub fn format(mut self, format: ExportFormat) -> Self {
        self.destination_format = format;
        self
    }

    /// Sets the CSV column separator.
    #[must_use]
    pub fn field_delimiter(mut self, delimiter: char) -> Self {
        self.field_delimiter = delimiter;
        self
    }

    /// Sets whether CSV files get a header line.
    #[must_use]
    pub fn print_header(mut self, print_header: bool) -> Self {
        self.print_header = print_header;
        self
    }

    /// Sets rows per sharded file.
    #[must_use]
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Adds another destination URI.
    #[must_use]
    pub fn also_to(mut self, destination_uri: impl Into<String>) -> Self {
        self.destination_uris.push(destination_uri.into());
        self
    }

    /// Checks arguments that can be rejected before the job starts.
    pub fn validate(&self) -> WarehouseResult<()> {
        if self.destination_uris.is_empty() {
            return Err(WarehouseError::invalid_argument("no destination URIs"));
        }
        if self.page_size == 0 {
            return Err(WarehouseError::invalid_argument("page size must be positive"));
        }
        if self.destination_uris.len() > 1 && self.destination_uris.iter().any(|u| !u.contains('*')) {
            return Err(WarehouseError::invalid_argument(
                "every destination needs a wildcard when exporting to several",
            ));
        }
        Ok(())
    }
}

/// Counters filled in when a job finishes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractStatistics {
    /// Files written per destination URI, in configuration order.
    pub destination_uri_file_counts: Vec<u64>,
    /// Rows written across all files.
    pub rows_exported: u64,
    /// Every file written.
    pub files: Vec<String>,
}

/// An export job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Job name.
    pub reference: JobReference,
    /// What the job does.
    pub configuration: ExtractConfig,
    /// Where it is in its lifecycle.
    pub status: JobStatus,
    /// Results, once done.
    pub statistics: Option<ExtractStatistics>,
}

impl Job {
    /// Whether the job has finished.
    pub fn is_done(&self) -> bool {
        self.status.state == JobState::Done
    }

    /// Converts a failed job into an error.
    pub fn into_result(self) -> WarehouseResult<Job> {
        match &self.status.error_result {
            Some(error) => Err(WarehouseError::JobFailed {
                job_id: self.reference.job_id.clone(),
                reason: error.reason.clone(),
                message: error.message.clone(),
            }),
            None => Ok(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_validation() {
        let table = TableReference::new("p", "d", "t");
        assert!(ExtractConfig::new(table.clone(), "gs://b/x").validate().is_ok());
        assert!(ExtractConfig::new(table.clone(), "gs://b/x").page_size(0).validate().is_err());
        assert!(ExtractConfig::new(table.clone(), "gs://b/x")
            .also_to("gs://b/y-*")
            .validate()
            .is_err());
        assert!(ExtractConfig::new(table, "gs://b/x-*")
            .also_to("gs://b/y-*")
            .validate()
            .is_ok());
    }

    #[test]
    fn table_reference_display() {
        assert_eq!(TableReference::new("p", "d", "t").to_string(), "p:d.t");
    }

    #[test]
    fn job_json_uses_service_names() {
        let status = JobStatus {
            state: JobState::Done,
            error_result: Some(ErrorProto::new("notFound", "Not found: Table p:d.t")),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "DONE");
        assert_eq!(json["errorResult"]["reason"], "notFound");
    }
}
