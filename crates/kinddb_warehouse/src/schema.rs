//! Table schemas and row validation.

use crate::error::{WarehouseError, WarehouseResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A table row: column name to JSON value.
pub type Row = Map<String, Value>;

/// Column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    /// UTF-8 string.
    String,
    /// 64-bit signed integer.
    Integer,
    /// 64-bit float.
    Float,
    /// Boolean.
    Boolean,
}

/// Column mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldMode {
    /// May be null.
    #[default]
    Nullable,
    /// Must be present.
    Required,
    /// Array of values.
    Repeated,
}

/// One column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Column name.
    pub name: String,
    /// Column type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Column mode.
    #[serde(default)]
    pub mode: FieldMode,
}

impl Field {
    /// Nullable column.
    pub fn nullable(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            mode: FieldMode::Nullable,
        }
    }

    /// Required column.
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            mode: FieldMode::Required,
            ..Self::nullable(name, field_type)
        }
    }

    /// Repeated column.
    pub fn repeated(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            mode: FieldMode::Repeated,
            ..Self::nullable(name, field_type)
        }
    }

    fn check_scalar(&self, value: &Value) -> WarehouseResult<()> {
        let ok = match self.field_type {
            FieldType::String => value.is_string(),
            FieldType::Integer => value.is_i64(),
            FieldType::Float => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
        };
        if ok {
            Ok(())
        } else {
            Err(WarehouseError::invalid_row(format!(
                "field {} expects {:?}, got {value}",
                self.name, self.field_type
            )))
        }
    }
}

/// Ordered list of columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Columns in table order.
    pub fields: Vec<Field>,
}

impl TableSchema {
    /// Creates a schema from columns.
    pub fn new(fields: Vec<Field>) -> WarehouseResult<Self> {
        for (i, field) in fields.iter().enumerate() {
            if field.name.is_empty() {
                return Err(WarehouseError::invalid_argument("field name must not be empty"));
            }
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(WarehouseError::invalid_argument(format!(
                    "duplicate field {}",
                    field.name
                )));
            }
        }
        Ok(Self { fields })
    }

    /// Whether any column is repeated.
    pub fn has_repeated(&self) -> bool {
        self.fields.iter().any(|f| f.mode == FieldMode::Repeated)
    }

    /// Checks that `row` fits the schema.
    pub fn validate_row(&self, row: &Row) -> WarehouseResult<()> {
        if let Some(unknown) = row.keys().find(|k| !self.fields.iter().any(|f| &f.name == *k)) {
            return Err(WarehouseError::invalid_row(format!("no such field: {unknown}")));
        }
        for field in &self.fields {
            match (field.mode, row.get(&field.name)) {
                (FieldMode::Required, None | Some(Value::Null)) => {
                    return Err(WarehouseError::invalid_row(format!(
                        "missing required field {}",
                        field.name
                    )));
                }
                (_, None | Some(Value::Null)) => {}
                (FieldMode::Repeated, Some(Value::Array(items))) => {
                    items.iter().try_for_each(|item| field.check_scalar(item))?;
                }
                (FieldMode::Repeated, Some(other)) => {
                    return Err(WarehouseError::invalid_row(format!(
                        "repeated field {} expects an array, got {other}",
                        field.name
                    )));
                }
                (_, Some(value)) => field.check_scalar(value)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> TableSchema {
        TableSchema::new(vec![
            Field::required("name", FieldType::String),
            Field::nullable("age", FieldType::Integer),
            Field::nullable("score", FieldType::Float),
            Field::repeated("tags", FieldType::String),
        ])
        .unwrap()
    }

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn accepts_matching_rows() {
        let schema = schema();
        schema
            .validate_row(&row(json!({"name": "a", "age": 3, "score": 1.5, "tags": ["x"]})))
            .unwrap();
        schema.validate_row(&row(json!({"name": "a", "age": null}))).unwrap();
        assert!(schema.has_repeated());
    }

    #[test]
    fn rejects_bad_rows() {
        let schema = schema();
        for bad in [
            json!({"age": 1}),
            json!({"name": "a", "age": "old"}),
            json!({"name": "a", "tags": "x"}),
            json!({"name": "a", "tags": [1]}),
            json!({"name": "a", "extra": true}),
        ] {
            assert!(schema.validate_row(&row(bad)).is_err());
        }
    }

    #[test]
    fn duplicate_fields_are_rejected() {
        assert!(TableSchema::new(vec![
            Field::nullable("a", FieldType::String),
            Field::nullable("a", FieldType::Integer),
        ])
        .is_err());
    }

    #[test]
    fn schema_json_uses_service_names() {
        let json = serde_json::to_value(Field::repeated("tags", FieldType::String)).unwrap();
        assert_eq!(json, json!({"name": "tags", "type": "STRING", "mode": "REPEATED"}));
        let parsed: Field = serde_json::from_value(json!({"name": "n", "type": "INTEGER"})).unwrap();
        assert_eq!(parsed.mode, FieldMode::Nullable);
    }
}
