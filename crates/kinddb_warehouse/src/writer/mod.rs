//! File writers for each export format.

pub mod avro;
pub mod csv;
pub mod json;

use crate::error::WarehouseResult;
use crate::format::ExportFormat;
use crate::schema::{Row, TableSchema};

/// Options that shape CSV output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Column separator.
    pub field_delimiter: char,
    /// Whether the first line names the columns.
    pub print_header: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            field_delimiter: ',',
            print_header: true,
        }
    }
}

/// Encodes `rows` as one file in `format`.
pub fn write_rows(
    format: ExportFormat,
    schema: &TableSchema,
    rows: &[Row],
    options: WriteOptions,
) -> WarehouseResult<Vec<u8>> {
    match format {
        ExportFormat::Csv => csv::write(schema, rows, options.field_delimiter, options.print_header),
        ExportFormat::NewlineDelimitedJson => json::write(schema, rows),
        ExportFormat::Avro => avro::write(schema, rows),
    }
}
