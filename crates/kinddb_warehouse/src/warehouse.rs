//! Warehouse service: datasets, tables and export jobs.

use crate::error::{WarehouseError, WarehouseResult};
use crate::format::ExportFormat;
use crate::job::{
    ErrorProto, ExtractConfig, ExtractStatistics, Job, JobReference, JobState, JobStatus,
    TableReference,
};
use crate::schema::{FieldMode, Row, TableSchema};
use crate::storage::{DestinationUri, ObjectStore};
use crate::writer::{write_rows, WriteOptions};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A table and its rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// Table name.
    pub reference: TableReference,
    /// Columns.
    pub schema: TableSchema,
    /// Rows in insertion order.
    pub rows: Vec<Row>,
}

type DatasetKey = (String, String);

/// Finished jobs kept for [`Warehouse::get_job`] before the oldest is dropped.
pub const DEFAULT_FINISHED_JOB_LIMIT: usize = 1000;

#[derive(Debug)]
struct Inner {
    datasets: RwLock<BTreeMap<DatasetKey, BTreeMap<String, Table>>>,
    jobs: RwLock<HashMap<String, Job>>,
    /// Finished job ids, oldest first.
    finished: Mutex<VecDeque<String>>,
    finished_job_limit: usize,
    storage: ObjectStore,
    job_latency: Duration,
    unavailable: Mutex<u32>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            datasets: RwLock::default(),
            jobs: RwLock::default(),
            finished: Mutex::default(),
            finished_job_limit: DEFAULT_FINISHED_JOB_LIMIT,
            storage: ObjectStore::default(),
            job_latency: Duration::ZERO,
            unavailable: Mutex::default(),
        }
    }
}

/// An in-process data warehouse.
///
/// Cloning is cheap and every clone sees the same datasets, jobs and object
/// store. Export jobs run on their own threads; poll them with
/// [`Warehouse::get_job`].
#[derive(Debug, Clone, Default)]
pub struct Warehouse {
    inner: Arc<Inner>,
}

impl Warehouse {
    /// Creates an empty warehouse with its own object store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a warehouse where each job phase takes `latency`.
    pub fn with_job_latency(latency: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                job_latency: latency,
                ..Inner::default()
            }),
        }
    }

    /// Creates a warehouse that keeps at most `limit` finished jobs.
    ///
    /// Older finished jobs are forgotten and report not found. The limit is
    /// at least one.
    pub fn with_finished_job_limit(limit: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                finished_job_limit: limit.max(1),
                ..Inner::default()
            }),
        }
    }

    /// Object store export jobs write to.
    pub fn storage(&self) -> &ObjectStore {
        &self.inner.storage
    }

    /// Makes the next `count` job insertions fail as unavailable.
    pub fn inject_unavailable(&self, count: u32) {
        *self.inner.unavailable.lock() = count;
    }

    /// Creates a dataset.
    pub fn create_dataset(&self, project_id: &str, dataset_id: &str) -> WarehouseResult<()> {
        let key = (project_id.to_string(), dataset_id.to_string());
        let mut datasets = self.inner.datasets.write();
        if datasets.contains_key(&key) {
            return Err(WarehouseError::AlreadyExists {
                resource: format!("dataset {project_id}:{dataset_id}"),
            });
        }
        datasets.insert(key, BTreeMap::new());
        Ok(())
    }

    /// Creates an empty table in an existing dataset.
    pub fn create_table(&self, reference: &TableReference, schema: TableSchema) -> WarehouseResult<()> {
        let mut datasets = self.inner.datasets.write();
        let dataset = datasets
            .get_mut(&(reference.project_id.clone(), reference.dataset_id.clone()))
            .ok_or_else(|| {
                WarehouseError::not_found(format!(
                    "dataset {}:{}",
                    reference.project_id, reference.dataset_id
                ))
            })?;
        if dataset.contains_key(&reference.table_id) {
            return Err(WarehouseError::AlreadyExists {
                resource: format!("table {reference}"),
            });
        }
        dataset.insert(
            reference.table_id.clone(),
            Table {
                reference: reference.clone(),
                schema,
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    /// Appends rows after checking every one against the schema.
    pub fn insert_rows(
        &self,
        reference: &TableReference,
        rows: impl IntoIterator<Item = Row>,
    ) -> WarehouseResult<usize> {
        let rows: Vec<Row> = rows.into_iter().collect();
        let mut datasets = self.inner.datasets.write();
        let table = datasets
            .get_mut(&(reference.project_id.clone(), reference.dataset_id.clone()))
            .and_then(|d| d.get_mut(&reference.table_id))
            .ok_or_else(|| WarehouseError::not_found(format!("table {reference}")))?;
        for row in &rows {
            table.schema.validate_row(row)?;
        }
        let count = rows.len();
        table.rows.extend(rows);
        debug!(table = %reference, rows = count, "inserted rows");
        Ok(count)
    }

    /// Snapshot of a table.
    pub fn table(&self, reference: &TableReference) -> WarehouseResult<Table> {
        self.inner
            .datasets
            .read()
            .get(&(reference.project_id.clone(), reference.dataset_id.clone()))
            .and_then(|d| d.get(&reference.table_id))
            .cloned()
            .ok_or_else(|| WarehouseError::not_found(format!("table {reference}")))
    }

    /// Starts an export job and returns its reference at once.
    ///
    /// Problems with the table or destination are reported on the finished
    /// job, not here.
    pub fn insert_export_job(
        &self,
        project_id: &str,
        config: ExtractConfig,
    ) -> WarehouseResult<JobReference> {
        {
            let mut unavailable = self.inner.unavailable.lock();
            if *unavailable > 0 {
                *unavailable -= 1;
                return Err(WarehouseError::Unavailable {
                    message: "backend error, retry later".into(),
                });
            }
        }
        config.validate()?;

        let reference = JobReference {
            project_id: project_id.to_string(),
            job_id: format!("job_{}", Uuid::new_v4().simple()),
        };
        let job = Job {
            reference: reference.clone(),
            configuration: config,
            status: JobStatus {
                state: JobState::Pending,
                error_result: None,
            },
            statistics: None,
        };
        self.inner
            .jobs
            .write()
            .insert(reference.job_id.clone(), job);

        let warehouse = self.clone();
        let job_id = reference.job_id.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("export-{job_id}"))
            .spawn(move || warehouse.run_job(&job_id));
        if let Err(e) = spawned {
            self.inner.jobs.write().remove(&reference.job_id);
            return Err(WarehouseError::Unavailable {
                message: format!("cannot start job: {e}"),
            });
        }

        info!(job_id = %reference.job_id, "export job inserted");
        Ok(reference)
    }

    /// Current state of a job.
    pub fn get_job(&self, reference: &JobReference) -> WarehouseResult<Job> {
        self.inner
            .jobs
            .read()
            .get(&reference.job_id)
            .filter(|job| job.reference.project_id == reference.project_id)
            .cloned()
            .ok_or_else(|| WarehouseError::not_found(format!("job {}", reference.job_id)))
    }

    fn set_state(&self, job_id: &str, update: impl FnOnce(&mut Job)) {
        if let Some(job) = self.inner.jobs.write().get_mut(job_id) {
            update(job);
        }
    }

    fn run_job(&self, job_id: &str) {
        let latency = self.inner.job_latency;
        std::thread::sleep(latency);
        self.set_state(job_id, |job| job.status.state = JobState::Running);

        let config = self
            .inner
            .jobs
            .read()
            .get(job_id)
            .map(|job| job.configuration.clone());
        let Some(config) = config else {
            return;
        };
        std::thread::sleep(latency);

        let outcome = self.extract(&config);
        match &outcome {
            Ok(stats) => info!(
                job_id,
                rows = stats.rows_exported,
                files = stats.files.len(),
                "export job done"
            ),
            Err(error) => warn!(job_id, reason = %error.reason, message = %error.message, "export job failed"),
        }
        self.finish(job_id, outcome);
    }

    /// Marks a job done and forgets the oldest finished jobs past the limit.
    /// Both happen under the jobs lock.
    fn finish(&self, job_id: &str, outcome: Result<ExtractStatistics, ErrorProto>) {
        let mut jobs = self.inner.jobs.write();
        let Some(job) = jobs.get_mut(job_id) else {
            return;
        };
        job.status.state = JobState::Done;
        match outcome {
            Ok(stats) => job.statistics = Some(stats),
            Err(error) => job.status.error_result = Some(error),
        }

        let mut finished = self.inner.finished.lock();
        finished.push_back(job_id.to_string());
        while finished.len() > self.inner.finished_job_limit {
            if let Some(old) = finished.pop_front() {
                jobs.remove(&old);
                debug!(job_id = %old, "forgot finished job");
            }
        }
    }

    fn extract(&self, config: &ExtractConfig) -> Result<ExtractStatistics, ErrorProto> {
        let table = self.table(&config.source_table).map_err(|_| {
            ErrorProto::new("notFound", format!("Not found: Table {}", config.source_table))
        })?;

        if config.destination_format == ExportFormat::Csv {
            if let Some(field) = table.schema.fields.iter().find(|f| f.mode == FieldMode::Repeated) {
                return Err(ErrorProto::new(
                    "invalid",
                    format!(
                        "Operation cannot be performed on a nested schema. Field: {}",
                        field.name
                    ),
                ));
            }
        }

        let destinations = config
            .destination_uris
            .iter()
            .map(|uri| DestinationUri::parse(uri))
            .collect::<WarehouseResult<Vec<_>>>()
            .map_err(|e| ErrorProto::new("invalid", e.to_string()))?;
        if let Some(dest) = destinations.iter().find(|d| !self.storage().has_bucket(d.bucket())) {
            return Err(ErrorProto::new(
                "notFound",
                format!("Not found: bucket {}", dest.bucket()),
            ));
        }

        let sharded = destinations.iter().all(DestinationUri::is_sharded);
        let chunks: Vec<&[Row]> = if sharded && !table.rows.is_empty() {
            table.rows.chunks(config.page_size).collect()
        } else {
            vec![&table.rows[..]]
        };

        let options = WriteOptions {
            field_delimiter: config.field_delimiter,
            print_header: config.print_header,
        };
        let mut stats = ExtractStatistics {
            destination_uri_file_counts: vec![0; destinations.len()],
            ..ExtractStatistics::default()
        };
        for (i, chunk) in chunks.iter().enumerate() {
            let slot = i % destinations.len();
            let uri = destinations[slot].shard(i / destinations.len());
            let bytes = write_rows(config.destination_format, &table.schema, chunk, options)
                .map_err(|e| ErrorProto::new("invalid", e.to_string()))?;
            self.storage()
                .put(&uri, bytes)
                .map_err(|e| ErrorProto::new("backendError", e.to_string()))?;
            stats.destination_uri_file_counts[slot] += 1;
            stats.rows_exported += chunk.len() as u64;
            stats.files.push(uri);
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, FieldType};
    use serde_json::json;
    use std::time::Instant;

    fn table_ref() -> TableReference {
        TableReference::new("p", "d", "people")
    }

    fn setup() -> Warehouse {
        let wh = Warehouse::new();
        wh.create_dataset("p", "d").unwrap();
        wh.create_table(
            &table_ref(),
            TableSchema::new(vec![
                Field::required("name", FieldType::String),
                Field::nullable("age", FieldType::Integer),
            ])
            .unwrap(),
        )
        .unwrap();
        let rows = (0..7).filter_map(|i| json!({"name": format!("n{i}"), "age": i}).as_object().cloned());
        wh.insert_rows(&table_ref(), rows).unwrap();
        wh.storage().create_bucket("b");
        wh
    }

    fn wait(wh: &Warehouse, reference: &JobReference) -> Job {
        let start = Instant::now();
        loop {
            let job = wh.get_job(reference).unwrap();
            if job.is_done() || start.elapsed() > Duration::from_secs(10) {
                return job;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn duplicate_resources_are_rejected() {
        let wh = setup();
        assert!(matches!(
            wh.create_dataset("p", "d"),
            Err(WarehouseError::AlreadyExists { .. })
        ));
        assert!(wh.create_table(&table_ref(), TableSchema::default()).is_err());
        assert!(wh
            .create_table(&TableReference::new("p", "missing", "t"), TableSchema::default())
            .is_err());
    }

    #[test]
    fn bad_rows_leave_table_unchanged() {
        let wh = setup();
        let rows = [json!({"name": "ok"}), json!({"age": 1})]
            .into_iter()
            .filter_map(|v| v.as_object().cloned());
        assert!(wh.insert_rows(&table_ref(), rows).is_err());
        assert_eq!(wh.table(&table_ref()).unwrap().rows.len(), 7);
    }

    #[test]
    fn sharded_export_splits_by_page_size() {
        let wh = setup();
        let config = ExtractConfig::new(table_ref(), "gs://b/people-*.csv").page_size(3);
        let job = wait(&wh, &wh.insert_export_job("p", config).unwrap());
        assert!(job.status.error_result.is_none());
        let stats = job.statistics.unwrap();
        assert_eq!(stats.rows_exported, 7);
        assert_eq!(stats.destination_uri_file_counts, [3]);
        assert_eq!(
            wh.storage().list("gs://b/people-"),
            [
                "gs://b/people-000000000000.csv",
                "gs://b/people-000000000001.csv",
                "gs://b/people-000000000002.csv",
            ]
        );
        let last = wh.storage().get("gs://b/people-000000000002.csv").unwrap();
        assert_eq!(String::from_utf8(last).unwrap(), "name,age\nn6,6\n");
    }

    #[test]
    fn failures_are_recorded_on_the_job() {
        let wh = setup();
        let missing = ExtractConfig::new(TableReference::new("p", "d", "nope"), "gs://b/x.csv");
        let job = wait(&wh, &wh.insert_export_job("p", missing).unwrap());
        assert_eq!(job.status.state, JobState::Done);
        assert_eq!(job.status.error_result.as_ref().unwrap().reason, "notFound");
        assert!(matches!(job.into_result(), Err(WarehouseError::JobFailed { .. })));

        let no_bucket = ExtractConfig::new(table_ref(), "gs://other/x.csv");
        let job = wait(&wh, &wh.insert_export_job("p", no_bucket).unwrap());
        assert_eq!(job.status.error_result.unwrap().reason, "notFound");

        let bad_uri = ExtractConfig::new(table_ref(), "ftp://b/x.csv");
        let job = wait(&wh, &wh.insert_export_job("p", bad_uri).unwrap());
        assert_eq!(job.status.error_result.unwrap().reason, "invalid");
    }

    #[test]
    fn jobs_belong_to_their_project() {
        let wh = setup();
        let reference = wh
            .insert_export_job("p", ExtractConfig::new(table_ref(), "gs://b/x.csv"))
            .unwrap();
        let foreign = JobReference {
            project_id: "q".into(),
            job_id: reference.job_id.clone(),
        };
        assert!(wh.get_job(&foreign).is_err());
        assert!(wh.get_job(&reference).is_ok());
    }

    #[test]
    fn oldest_finished_jobs_are_forgotten() {
        let wh = Warehouse::with_finished_job_limit(2);
        wh.create_dataset("p", "d").unwrap();
        wh.storage().create_bucket("b");
        let refs: Vec<JobReference> = (0..3)
            .map(|i| {
                let config = ExtractConfig::new(table_ref(), format!("gs://b/x{i}.csv"));
                let reference = wh.insert_export_job("p", config).unwrap();
                assert!(wait(&wh, &reference).is_done());
                reference
            })
            .collect();
        assert!(matches!(wh.get_job(&refs[0]), Err(WarehouseError::NotFound { .. })));
        assert!(wh.get_job(&refs[1]).unwrap().is_done());
        assert!(wh.get_job(&refs[2]).unwrap().is_done());
    }

    #[test]
    fn injected_unavailability_is_transient() {
        let wh = setup();
        wh.inject_unavailable(1);
        let err = wh
            .insert_export_job("p", ExtractConfig::new(table_ref(), "gs://b/x.csv"))
            .unwrap_err();
        assert!(err.is_transient());
        assert!(wh
            .insert_export_job("p", ExtractConfig::new(table_ref(), "gs://b/x.csv"))
            .is_ok());
    }
}
