//! Avro object container output.
//!
//! Files use the `null` codec. A nullable column is the union
//! `["null", T]`; a repeated column is an array of `T`.

use crate::error::{WarehouseError, WarehouseResult};
use crate::schema::{Field, FieldMode, FieldType, Row, TableSchema};
use apache_avro::types::Value as AvroValue;
use apache_avro::{Reader, Schema, Writer};
use serde_json::{json, Value};

fn primitive(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::String => "string",
        FieldType::Integer => "long",
        FieldType::Float => "double",
        FieldType::Boolean => "boolean",
    }
}

/// Avro record schema for a table, as JSON.
pub fn schema_json(schema: &TableSchema) -> Value {
    let fields: Vec<Value> = schema
        .fields
        .iter()
        .map(|f| {
            let ty = primitive(f.field_type);
            let avro_type = match f.mode {
                FieldMode::Nullable => json!(["null", ty]),
                FieldMode::Required => json!(ty),
                FieldMode::Repeated => json!({"type": "array", "items": ty}),
            };
            json!({"name": f.name, "type": avro_type})
        })
        .collect();
    json!({"type": "record", "name": "Root", "fields": fields})
}

/// Parsed Avro record schema for a table.
pub fn avro_schema(schema: &TableSchema) -> WarehouseResult<Schema> {
    Ok(Schema::parse_str(&schema_json(schema).to_string())?)
}

/// Writes rows as an Avro object container file.
pub fn write(schema: &TableSchema, rows: &[Row]) -> WarehouseResult<Vec<u8>> {
    let avro = avro_schema(schema)?;
    let mut writer = Writer::new(&avro, Vec::new());
    for row in rows {
        let fields = schema
            .fields
            .iter()
            .map(|f| Ok((f.name.clone(), to_avro(f, row.get(&f.name))?)))
            .collect::<WarehouseResult<Vec<_>>>()?;
        writer.append(AvroValue::Record(fields))?;
    }
    Ok(writer.into_inner()?)
}

fn to_avro(field: &Field, value: Option<&Value>) -> WarehouseResult<AvroValue> {
    let value = value.filter(|v| !v.is_null());
    Ok(match (field.mode, value) {
        (FieldMode::Nullable, None) => AvroValue::Union(0, Box::new(AvroValue::Null)),
        (FieldMode::Nullable, Some(v)) => AvroValue::Union(1, Box::new(scalar(field, v)?)),
        (FieldMode::Required, Some(v)) => scalar(field, v)?,
        (FieldMode::Required, None) => {
            return Err(WarehouseError::invalid_row(format!(
                "missing required field {}",
                field.name
            )))
        }
        (FieldMode::Repeated, None) => AvroValue::Array(Vec::new()),
        (FieldMode::Repeated, Some(Value::Array(items))) => AvroValue::Array(
            items
                .iter()
                .map(|item| scalar(field, item))
                .collect::<WarehouseResult<_>>()?,
        ),
        (FieldMode::Repeated, Some(other)) => {
            return Err(WarehouseError::invalid_row(format!(
                "repeated field {} expects an array, got {other}",
                field.name
            )))
        }
    })
}

fn scalar(field: &Field, value: &Value) -> WarehouseResult<AvroValue> {
    let mismatch = || {
        WarehouseError::invalid_row(format!(
            "field {} expects {:?}, got {value}",
            field.name, field.field_type
        ))
    };
    Ok(match field.field_type {
        FieldType::String => AvroValue::String(value.as_str().ok_or_else(mismatch)?.to_string()),
        FieldType::Integer => AvroValue::Long(value.as_i64().ok_or_else(mismatch)?),
        FieldType::Float => AvroValue::Double(value.as_f64().ok_or_else(mismatch)?),
        FieldType::Boolean => AvroValue::Boolean(value.as_bool().ok_or_else(mismatch)?),
    })
}

/// A decoded container file.
#[derive(Debug, Clone, PartialEq)]
pub struct AvroFile {
    /// Writer schema from the file header.
    pub schema: Schema,
    /// Records as JSON objects.
    pub rows: Vec<Row>,
}

fn malformed(message: impl std::fmt::Display) -> WarehouseError {
    WarehouseError::invalid_argument(format!("malformed avro file: {message}"))
}

fn to_json(value: AvroValue) -> WarehouseResult<Value> {
    Ok(match value {
        AvroValue::Null => Value::Null,
        AvroValue::Boolean(b) => Value::Bool(b),
        AvroValue::Int(n) => Value::from(n),
        AvroValue::Long(n) => Value::from(n),
        AvroValue::Float(f) => Value::from(f64::from(f)),
        AvroValue::Double(f) => Value::from(f),
        AvroValue::String(s) => Value::String(s),
        AvroValue::Union(_, inner) => to_json(*inner)?,
        AvroValue::Array(items) => {
            Value::Array(items.into_iter().map(to_json).collect::<WarehouseResult<_>>()?)
        }
        other => return Err(malformed(format!("unsupported value {other:?}"))),
    })
}

/// Reads an object container file of records.
pub fn read(data: &[u8]) -> WarehouseResult<AvroFile> {
    let reader = Reader::new(data)?;
    let schema = reader.writer_schema().clone();
    let mut rows = Vec::new();
    for value in reader {
        let AvroValue::Record(fields) = value? else {
            return Err(malformed("top-level value is not a record"));
        };
        let mut row = Row::new();
        for (name, value) in fields {
            row.insert(name, to_json(value)?);
        }
        rows.push(row);
    }
    Ok(AvroFile { schema, rows })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> TableSchema {
        TableSchema::new(vec![
            Field::required("name", FieldType::String),
            Field::nullable("age", FieldType::Integer),
            Field::nullable("score", FieldType::Float),
            Field::nullable("active", FieldType::Boolean),
            Field::repeated("tags", FieldType::String),
        ])
        .unwrap()
    }

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn header_carries_schema() {
        let bytes = write(&schema(), &[]).unwrap();
        assert_eq!(&bytes[..4], b"Obj\x01");
        let file = read(&bytes).unwrap();
        assert_eq!(file.schema, avro_schema(&schema()).unwrap());
        assert!(file.rows.is_empty());
    }

    #[test]
    fn rows_read_back() {
        let rows = vec![
            row(json!({"name": "Ann", "age": 30, "score": 2.5, "active": true, "tags": ["a", "b"]})),
            row(json!({"name": "Bo", "age": null})),
        ];

        let file = read(&write(&schema(), &rows).unwrap()).unwrap();
        assert_eq!(file.rows.len(), 2);
        assert_eq!(
            Value::Object(file.rows[0].clone()),
            json!({"name": "Ann", "age": 30, "score": 2.5, "active": true, "tags": ["a", "b"]})
        );
        assert_eq!(
            Value::Object(file.rows[1].clone()),
            json!({"name": "Bo", "age": null, "score": null, "active": null, "tags": []})
        );
    }

    #[test]
    fn records_decode_with_union_branches() {
        let rows = vec![row(json!({"name": "Ann", "age": 30}))];
        let bytes = write(&schema(), &rows).unwrap();
        let values: Vec<AvroValue> = Reader::new(&bytes[..])
            .unwrap()
            .map(|v| v.unwrap())
            .collect();
        let AvroValue::Record(fields) = &values[0] else {
            panic!("expected a record, got {:?}", values[0]);
        };
        assert_eq!(fields[0], ("name".to_string(), AvroValue::String("Ann".into())));
        assert_eq!(
            fields[1],
            ("age".to_string(), AvroValue::Union(1, Box::new(AvroValue::Long(30))))
        );
        assert_eq!(
            fields[2],
            ("score".to_string(), AvroValue::Union(0, Box::new(AvroValue::Null)))
        );
    }

    #[test]
    fn repeated_field_rejects_scalars() {
        let rows = vec![row(json!({"name": "Ann", "tags": "a"}))];
        assert!(matches!(
            write(&schema(), &rows),
            Err(WarehouseError::InvalidRow { .. })
        ));
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let rows = vec![row(json!({"age": 3}))];
        assert!(matches!(
            write(&schema(), &rows),
            Err(WarehouseError::InvalidRow { .. })
        ));
    }

    #[test]
    fn truncated_file_is_an_error() {
        let rows = vec![row(json!({"name": "Ann"}))];
        let bytes = write(&schema(), &rows).unwrap();
        assert!(read(&bytes[..bytes.len() / 2]).is_err());
    }
}
