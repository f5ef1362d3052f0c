//! Table export sample.

use kinddb_warehouse::{export_table, ExportFormat, ExportRequest, Job, Warehouse, WarehouseResult};
use std::time::Duration;
use tracing::info;

/// Exports a table to object storage and waits for the job.
///
/// `page_size` is the number of rows per file when `cloud_storage_path`
/// contains a `*`. `timeout` bounds the wait. `export_format` is one of
/// `CSV`, `NEWLINE_DELIMITED_JSON` or `AVRO`.
#[allow(clippy::too_many_arguments)]
pub fn export_data_to_cloud_storage(
    warehouse: &Warehouse,
    cloud_storage_path: &str,
    project_id: &str,
    dataset_id: &str,
    table_id: &str,
    page_size: usize,
    timeout: Duration,
    export_format: &str,
) -> WarehouseResult<Job> {
    let format: ExportFormat = export_format.parse()?;
    let request = ExportRequest::new(cloud_storage_path, project_id, dataset_id, table_id)
        .page_size(page_size)
        .timeout(timeout)
        .format(format);

    info!(%format, destination = cloud_storage_path, "exporting table");
    let job = export_table(warehouse, &request)?;
    info!(job_id = %job.reference.job_id, "export done");
    Ok(job)
}
