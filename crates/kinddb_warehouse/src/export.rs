//! Blocking table export.
//!
//! [`export_table`] starts an extract job, retrying while the service is
//! unavailable, then polls it until it finishes or the timeout passes.

use crate::error::{WarehouseError, WarehouseResult};
use crate::format::ExportFormat;
use crate::job::{ExtractConfig, Job, TableReference};
use crate::warehouse::Warehouse;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Parameters for [`export_table`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    /// Destination URI, optionally with one `*` for sharded output.
    pub destination_uri: String,
    /// Project owning the table and the job.
    pub project_id: String,
    /// Dataset holding the table.
    pub dataset_id: String,
    /// Table to export.
    pub table_id: String,
    /// Rows per file for sharded destinations.
    pub page_size: usize,
    /// How long to wait for the job.
    pub timeout: Duration,
    /// Extra attempts when inserting the job is rejected as unavailable.
    pub num_retries: u32,
    /// Pause between status checks and between insert attempts.
    pub poll_interval: Duration,
    /// Output format.
    pub format: ExportFormat,
    /// Whether CSV files start with a header line.
    pub print_header: bool,
    /// CSV column separator.
    pub field_delimiter: char,
}

impl ExportRequest {
    /// Default job timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
    /// Default status poll interval.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
    /// Default insert retry count.
    pub const DEFAULT_NUM_RETRIES: u32 = 5;

    /// Exports `project_id:dataset_id.table_id` to `destination_uri` as CSV.
    pub fn new(
        destination_uri: impl Into<String>,
        project_id: impl Into<String>,
        dataset_id: impl Into<String>,
        table_id: impl Into<String>,
    ) -> Self {
        Self {
            destination_uri: destination_uri.into(),
            project_id: project_id.into(),
            dataset_id: dataset_id.into(),
            table_id: table_id.into(),
            page_size: ExtractConfig::DEFAULT_PAGE_SIZE,
            timeout: Self::DEFAULT_TIMEOUT,
            num_retries: Self::DEFAULT_NUM_RETRIES,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            format: ExportFormat::Csv,
            print_header: true,
            field_delimiter: ',',
        }
    }

    /// Sets rows per sharded file.
    #[must_use]
    pub const fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Sets the job timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the insert retry count.
    #[must_use]
    pub const fn num_retries(mut self, num_retries: u32) -> Self {
        self.num_retries = num_retries;
        self
    }

    /// Sets the poll interval.
    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the output format.
    #[must_use]
    pub const fn format(mut self, format: ExportFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets whether CSV files get a header line.
    #[must_use]
    pub const fn print_header(mut self, print_header: bool) -> Self {
        self.print_header = print_header;
        self
    }

    /// Sets the CSV column separator.
    #[must_use]
    pub const fn field_delimiter(mut self, delimiter: char) -> Self {
        self.field_delimiter = delimiter;
        self
    }

    /// Source table.
    pub fn table(&self) -> TableReference {
        TableReference::new(&self.project_id, &self.dataset_id, &self.table_id)
    }

    /// Job configuration for this request.
    pub fn to_config(&self) -> ExtractConfig {
        ExtractConfig::new(self.table(), &self.destination_uri)
            .format(self.format)
            .page_size(self.page_size)
            .print_header(self.print_header)
            .field_delimiter(self.field_delimiter)
    }
}

/// Exports a table and blocks until the job is done.
///
/// Returns the finished job, [`WarehouseError::JobFailed`] when the job
/// reports an error, or [`WarehouseError::Timeout`] when it is still running
/// after `request.timeout`.
pub fn export_table(warehouse: &Warehouse, request: &ExportRequest) -> WarehouseResult<Job> {
    let config = request.to_config();
    let mut attempt = 0;
    let reference = loop {
        match warehouse.insert_export_job(&request.project_id, config.clone()) {
            Ok(reference) => break reference,
            Err(e) if e.is_transient() && attempt < request.num_retries => {
                attempt += 1;
                warn!(attempt, error = %e, "export job insert failed, retrying");
                std::thread::sleep(request.poll_interval);
            }
            Err(e) => return Err(e),
        }
    };
    info!(
        job_id = %reference.job_id,
        table = %config.source_table,
        destination = %request.destination_uri,
        format = %request.format,
        "waiting for export job"
    );

    let start = Instant::now();
    loop {
        let job = warehouse.get_job(&reference)?;
        if job.is_done() {
            return job.into_result();
        }
        let waited = start.elapsed();
        if waited >= request.timeout {
            return Err(WarehouseError::Timeout {
                job_id: reference.job_id,
                waited,
            });
        }
        debug!(job_id = %reference.job_id, state = ?job.status.state, "job not done yet");
        std::thread::sleep(request.poll_interval.min(request.timeout - waited));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builds_config() {
        let request = ExportRequest::new("gs://b/out-*.json", "p", "d", "t")
            .page_size(5)
            .format(ExportFormat::NewlineDelimitedJson)
            .print_header(false);
        let config = request.to_config();
        assert_eq!(config.source_table, TableReference::new("p", "d", "t"));
        assert_eq!(config.destination_uris, ["gs://b/out-*.json"]);
        assert_eq!(config.page_size, 5);
        assert_eq!(config.destination_format, ExportFormat::NewlineDelimitedJson);
        assert!(!config.print_header);
    }

    #[test]
    fn retries_run_out() {
        let warehouse = Warehouse::new();
        warehouse.inject_unavailable(3);
        let request = ExportRequest::new("gs://b/x.csv", "p", "d", "t")
            .num_retries(1)
            .poll_interval(Duration::from_millis(1));
        let err = export_table(&warehouse, &request).unwrap_err();
        assert!(err.is_transient());
    }
}
