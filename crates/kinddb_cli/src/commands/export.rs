//! Export command implementation.
//!
//! Loads a table from a JSON file into a scratch warehouse, exports it and
//! writes the resulting files to a local directory.

use kinddb_warehouse::{
    export_table, ExportFormat, ExportRequest, Row, TableReference, TableSchema, Warehouse,
};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

const PROJECT: &str = "local";
const DATASET: &str = "cli";
const BUCKET: &str = "local";

/// Input file layout: `{"schema": {"fields": [...]}, "rows": [...]}`.
#[derive(Debug, Deserialize)]
pub struct TableFile {
    /// Table columns.
    pub schema: TableSchema,
    /// Table rows.
    #[serde(default)]
    pub rows: Vec<Row>,
}

/// Options for the export command.
#[derive(Debug)]
pub struct ExportArgs {
    /// JSON table file.
    pub input: PathBuf,
    /// Directory to write files to.
    pub output_dir: PathBuf,
    /// Output format.
    pub format: ExportFormat,
    /// Rows per file; `None` writes a single file.
    pub page_size: Option<usize>,
    /// Job timeout.
    pub timeout: Duration,
    /// Whether CSV output has a header line.
    pub print_header: bool,
    /// CSV column separator.
    pub field_delimiter: char,
}

/// Exports the table and returns the paths written.
pub fn export_file(args: &ExportArgs) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(&args.input)?;
    let table_file: TableFile = serde_json::from_str(&text)?;
    let table_id = args
        .input
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("table")
        .to_string();

    let warehouse = Warehouse::new();
    warehouse.storage().create_bucket(BUCKET);
    warehouse.create_dataset(PROJECT, DATASET)?;
    let table = TableReference::new(PROJECT, DATASET, &table_id);
    warehouse.create_table(&table, TableSchema::new(table_file.schema.fields)?)?;
    let rows = warehouse.insert_rows(&table, table_file.rows)?;
    info!(table = %table, rows, "loaded table");

    let extension = args.format.extension();
    let mut request = ExportRequest::new(
        match args.page_size {
            Some(_) => format!("mem://{BUCKET}/{table_id}-*.{extension}"),
            None => format!("mem://{BUCKET}/{table_id}.{extension}"),
        },
        PROJECT,
        DATASET,
        &table_id,
    )
    .format(args.format)
    .timeout(args.timeout)
    .print_header(args.print_header)
    .field_delimiter(args.field_delimiter);
    if let Some(page_size) = args.page_size {
        request = request.page_size(page_size);
    }
    let job = export_table(&warehouse, &request)?;

    std::fs::create_dir_all(&args.output_dir)?;
    let prefix = format!("mem://{BUCKET}/");
    let mut written = Vec::new();
    for uri in job.statistics.map(|s| s.files).unwrap_or_default() {
        let data = warehouse
            .storage()
            .get(&uri)
            .ok_or_else(|| format!("export job reported missing file {uri}"))?;
        let name = uri.strip_prefix(&prefix).unwrap_or(&uri);
        let path = args.output_dir.join(name);
        std::fs::write(&path, data)?;
        written.push(path);
    }
    Ok(written)
}

/// Runs the export command.
pub fn run(args: &ExportArgs) -> Result<(), Box<dyn std::error::Error>> {
    let written = export_file(args)?;
    for path in &written {
        println!("{}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn write_table(dir: &Path) -> PathBuf {
        let path = dir.join("people.json");
        let table = serde_json::json!({
            "schema": {"fields": [
                {"name": "name", "type": "STRING", "mode": "REQUIRED"},
                {"name": "age", "type": "INTEGER"}
            ]},
            "rows": [
                {"name": "Ann", "age": 30},
                {"name": "Bo"},
                {"name": "Cy", "age": 41}
            ]
        });
        std::fs::write(&path, table.to_string()).unwrap();
        path
    }

    fn args(input: PathBuf, output_dir: PathBuf) -> ExportArgs {
        ExportArgs {
            input,
            output_dir,
            format: ExportFormat::Csv,
            page_size: None,
            timeout: Duration::from_secs(5),
            print_header: true,
            field_delimiter: ',',
        }
    }

    #[test]
    fn exports_single_csv_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_table(dir.path());
        let written = export_file(&args(input, dir.path().join("out"))).unwrap();
        assert_eq!(written, [dir.path().join("out").join("people.csv")]);
        let text = std::fs::read_to_string(&written[0]).unwrap();
        assert_eq!(text, "name,age\nAnn,30\nBo,\nCy,41\n");
    }

    #[test]
    fn exports_sharded_json() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_table(dir.path());
        let mut args = args(input, dir.path().join("out"));
        args.format = ExportFormat::NewlineDelimitedJson;
        args.page_size = Some(2);
        let written = export_file(&args).unwrap();
        assert_eq!(written.len(), 2);
        assert!(written[0].ends_with("people-000000000000.json"));
    }
}
