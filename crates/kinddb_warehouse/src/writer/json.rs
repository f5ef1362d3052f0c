//! Newline-delimited JSON output.

use crate::error::WarehouseResult;
use crate::schema::{FieldType, Row, TableSchema};
use serde_json::Value;

/// Writes one JSON object per line.
///
/// Null columns are omitted and integer columns are written as strings,
/// since 64-bit integers do not survive every JSON reader.
pub fn write(schema: &TableSchema, rows: &[Row]) -> WarehouseResult<Vec<u8>> {
    let mut out = Vec::new();
    for row in rows {
        let mut object = serde_json::Map::new();
        for field in &schema.fields {
            let Some(value) = row.get(&field.name).filter(|v| !v.is_null()) else {
                continue;
            };
            let value = match (field.field_type, value) {
                (FieldType::Integer, Value::Array(items)) => {
                    Value::Array(items.iter().map(integer_as_string).collect())
                }
                (FieldType::Integer, v) => integer_as_string(v),
                (_, v) => v.clone(),
            };
            object.insert(field.name.clone(), value);
        }
        serde_json::to_writer(&mut out, &object)?;
        out.push(b'\n');
    }
    Ok(out)
}

fn integer_as_string(value: &Value) -> Value {
    match value {
        Value::Number(n) => Value::String(n.to_string()),
        other => other.clone(),
    }
}
