//! End-to-end export through `export_table`.

use kinddb_warehouse::writer::{avro, csv};
use kinddb_warehouse::{
    export_table, ExportFormat, ExportRequest, Field, FieldType, Row, TableReference, TableSchema,
    Warehouse, WarehouseError,
};
use serde_json::{json, Value};
use std::time::Duration;

fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap()
}

fn warehouse() -> Warehouse {
    let warehouse = Warehouse::with_job_latency(Duration::from_millis(2));
    warehouse.storage().create_bucket("exports");
    warehouse.create_dataset("proj", "samples").unwrap();

    let shakespeare = TableReference::new("proj", "samples", "shakespeare");
    warehouse
        .create_table(
            &shakespeare,
            TableSchema::new(vec![
                Field::required("word", FieldType::String),
                Field::required("word_count", FieldType::Integer),
                Field::nullable("corpus", FieldType::String),
            ])
            .unwrap(),
        )
        .unwrap();
    let words = ["brave", "new", "world", "that", "has", "such", "people", "in't"];
    warehouse
        .insert_rows(
            &shakespeare,
            words
                .iter()
                .enumerate()
                .map(|(i, w)| row(json!({"word": w, "word_count": i + 1, "corpus": "tempest"}))),
        )
        .unwrap();

    let tagged = TableReference::new("proj", "samples", "tagged");
    warehouse
        .create_table(
            &tagged,
            TableSchema::new(vec![
                Field::required("id", FieldType::Integer),
                Field::repeated("tags", FieldType::String),
            ])
            .unwrap(),
        )
        .unwrap();
    warehouse
        .insert_rows(&tagged, [row(json!({"id": 1, "tags": ["a", "b"]}))])
        .unwrap();
    warehouse
}

#[test]
fn csv_export_with_shards() {
    let warehouse = warehouse();
    let request = ExportRequest::new("gs://exports/words-*.csv", "proj", "samples", "shakespeare")
        .page_size(5)
        .timeout(Duration::from_secs(5));
    let job = export_table(&warehouse, &request).unwrap();
    let stats = job.statistics.unwrap();
    assert_eq!(stats.rows_exported, 8);
    assert_eq!(stats.files.len(), 2);

    let first = warehouse.storage().get(&stats.files[0]).unwrap();
    let records = csv::parse(std::str::from_utf8(&first).unwrap(), ',');
    assert_eq!(records[0], ["word", "word_count", "corpus"]);
    assert_eq!(records.len(), 6);
    let second = warehouse.storage().get(&stats.files[1]).unwrap();
    let records = csv::parse(std::str::from_utf8(&second).unwrap(), ',');
    assert_eq!(records[3], ["in't", "8", "tempest"]);
}

#[test]
fn json_export_writes_one_object_per_line() {
    let warehouse = warehouse();
    let request = ExportRequest::new("mem://exports/words.json", "proj", "samples", "shakespeare")
        .format(ExportFormat::NewlineDelimitedJson);
    export_table(&warehouse, &request).unwrap();

    let data = warehouse.storage().get("mem://exports/words.json").unwrap();
    let lines: Vec<Value> = std::str::from_utf8(&data)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 8);
    assert_eq!(lines[0]["word"], "brave");
}

#[test]
fn avro_export_round_trips_nested_rows() {
    let warehouse = warehouse();
    let request = ExportRequest::new("gs://exports/tagged.avro", "proj", "samples", "tagged")
        .format(ExportFormat::Avro);
    export_table(&warehouse, &request).unwrap();

    let data = warehouse.storage().get("gs://exports/tagged.avro").unwrap();
    let file = avro::read(&data).unwrap();
    assert_eq!(apache_avro::Reader::new(&data[..]).unwrap().count(), 1);
    assert_eq!(file.rows, [row(json!({"id": 1, "tags": ["a", "b"]}))]);
}

#[test]
fn csv_export_of_nested_table_fails() {
    let warehouse = warehouse();
    let request = ExportRequest::new("gs://exports/tagged.csv", "proj", "samples", "tagged");
    match export_table(&warehouse, &request) {
        Err(WarehouseError::JobFailed { reason, message, .. }) => {
            assert_eq!(reason, "invalid");
            assert!(message.contains("nested schema"));
        }
        other => panic!("expected a failed job, got {other:?}"),
    }
    assert!(warehouse.storage().get("gs://exports/tagged.csv").is_none());
}

#[test]
fn slow_job_times_out() {
    let warehouse = Warehouse::with_job_latency(Duration::from_millis(300));
    warehouse.storage().create_bucket("exports");
    let request = ExportRequest::new("gs://exports/x.csv", "proj", "samples", "missing")
        .timeout(Duration::from_millis(50))
        .poll_interval(Duration::from_millis(10));
    assert!(matches!(
        export_table(&warehouse, &request),
        Err(WarehouseError::Timeout { .. })
    ));
}

#[test]
fn transient_insert_failures_are_retried() {
    let warehouse = warehouse();
    warehouse.inject_unavailable(2);
    let request = ExportRequest::new("gs://exports/words.csv", "proj", "samples", "shakespeare")
        .num_retries(2)
        .poll_interval(Duration::from_millis(1));
    let job = export_table(&warehouse, &request).unwrap();
    assert_eq!(job.statistics.unwrap().files, ["gs://exports/words.csv"]);
}
