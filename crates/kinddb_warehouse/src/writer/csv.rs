//! CSV output.

use crate::error::{WarehouseError, WarehouseResult};
use crate::schema::{FieldMode, Row, TableSchema};
use serde_json::Value;
use std::borrow::Cow;

/// Writes rows as CSV, one line per row in schema column order.
///
/// Fields containing the delimiter, a quote or a line break are quoted,
/// with embedded quotes doubled. Nulls are empty fields.
pub fn write(
    schema: &TableSchema,
    rows: &[Row],
    delimiter: char,
    print_header: bool,
) -> WarehouseResult<Vec<u8>> {
    if let Some(field) = schema.fields.iter().find(|f| f.mode == FieldMode::Repeated) {
        return Err(WarehouseError::invalid_argument(format!(
            "CSV cannot represent repeated field {}",
            field.name
        )));
    }

    let sep = delimiter.to_string();
    let mut out = String::new();
    if print_header {
        let header: Vec<_> = schema
            .fields
            .iter()
            .map(|f| quote(&f.name, delimiter))
            .collect();
        out.push_str(&header.join(&sep));
        out.push('\n');
    }
    for row in rows {
        let line: Vec<String> = schema
            .fields
            .iter()
            .map(|f| quote(&cell(row.get(&f.name)), delimiter).into_owned())
            .collect();
        out.push_str(&line.join(&sep));
        out.push('\n');
    }
    Ok(out.into_bytes())
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn quote(field: &str, delimiter: char) -> Cow<'_, str> {
    if field.contains([delimiter, '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

/// Splits CSV text into records of fields, undoing [`write`]'s quoting.
pub fn parse(text: &str, delimiter: char) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' if in_quotes => in_quotes = false,
            '"' if field.is_empty() => in_quotes = true,
            '\n' if !in_quotes => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            c if c == delimiter && !in_quotes => record.push(std::mem::take(&mut field)),
            c => field.push(c),
        }
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    records
}
