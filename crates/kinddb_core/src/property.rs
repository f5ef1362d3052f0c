//! Property values and typed property definitions.

use crate::error::{CoreError, CoreResult};
use crate::key::Key;
use crate::model::Entity;
use kinddb_codec::{CodecError, CodecResult, Decode, Encode, Value};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Longest indexed string value, in bytes.
pub const MAX_INDEXED_STRING_BYTES: usize = 1500;

/// A value held by an entity property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    /// Unset / none.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit integer.
    Integer(i64),
    /// Text, for both string and text properties.
    String(String),
    /// Raw bytes.
    Blob(Vec<u8>),
    /// Reference to another entity.
    Key(Key),
    /// Values of a repeated property.
    List(Vec<PropertyValue>),
}

impl PropertyValue {
    /// Builds a list value.
    pub fn list<T: Into<PropertyValue>>(items: impl IntoIterator<Item = T>) -> Self {
        PropertyValue::List(items.into_iter().map(Into::into).collect())
    }

    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Null => "null",
            PropertyValue::Bool(_) => "bool",
            PropertyValue::Integer(_) => "integer",
            PropertyValue::String(_) => "string",
            PropertyValue::Blob(_) => "blob",
            PropertyValue::Key(_) => "key",
            PropertyValue::List(_) => "list",
        }
    }

    /// Position of this value's type in the cross-type sort order.
    fn type_rank(&self) -> u8 {
        match self {
            PropertyValue::Null => 0,
            PropertyValue::Integer(_) => 1,
            PropertyValue::Bool(_) => 2,
            PropertyValue::String(_) => 3,
            PropertyValue::Blob(_) => 4,
            PropertyValue::Key(_) => 5,
            PropertyValue::List(_) => 6,
        }
    }

    /// True when both values have the same type rank.
    pub fn same_type(&self, other: &Self) -> bool {
        self.type_rank() == other.type_rank()
    }

    /// Total order used by query sorting: type rank first, then value.
    pub fn cmp_for_query(&self, other: &Self) -> Ordering {
        match (self, other) {
            (PropertyValue::Integer(a), PropertyValue::Integer(b)) => a.cmp(b),
            (PropertyValue::Bool(a), PropertyValue::Bool(b)) => a.cmp(b),
            (PropertyValue::String(a), PropertyValue::String(b)) => a.cmp(b),
            (PropertyValue::Blob(a), PropertyValue::Blob(b)) => a.cmp(b),
            (PropertyValue::Key(a), PropertyValue::Key(b)) => a.cmp(b),
            (PropertyValue::List(a), PropertyValue::List(b)) => a
                .iter()
                .zip(b)
                .map(|(x, y)| x.cmp_for_query(y))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }

    /// String payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer payload, if any.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            PropertyValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Bool payload, if any.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Key payload, if any.
    pub fn as_key(&self) -> Option<&Key> {
        match self {
            PropertyValue::Key(k) => Some(k),
            _ => None,
        }
    }

    /// List items, if any.
    pub fn as_list(&self) -> Option<&[PropertyValue]> {
        match self {
            PropertyValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// True for `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }
}

/// Marker key wrapping an entity key inside a stored property value.
const KEY_MARKER: &str = "$key";

impl Encode for PropertyValue {
    fn to_value(&self) -> Value {
        match self {
            PropertyValue::Null => Value::Null,
            PropertyValue::Bool(b) => Value::Bool(*b),
            PropertyValue::Integer(n) => Value::Integer(*n),
            PropertyValue::String(s) => Value::Text(s.clone()),
            PropertyValue::Blob(b) => Value::Bytes(b.clone()),
            PropertyValue::Key(k) => Value::text_map([(KEY_MARKER, k.to_value())]),
            PropertyValue::List(items) => {
                Value::Array(items.iter().map(Encode::to_value).collect())
            }
        }
    }
}

impl Decode for PropertyValue {
    fn from_value(value: &Value) -> CodecResult<Self> {
        Ok(match value {
            Value::Null => PropertyValue::Null,
            Value::Bool(b) => PropertyValue::Bool(*b),
            Value::Integer(n) => PropertyValue::Integer(*n),
            Value::Text(s) => PropertyValue::String(s.clone()),
            Value::Bytes(b) => PropertyValue::Blob(b.clone()),
            Value::Array(items) => PropertyValue::List(
                items
                    .iter()
                    .map(PropertyValue::from_value)
                    .collect::<CodecResult<_>>()?,
            ),
            Value::Map(_) => match value.get(KEY_MARKER) {
                Some(key) => PropertyValue::Key(Key::from_value(key)?),
                None => return Err(CodecError::unexpected_shape("property", "key reference")),
            },
        })
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

impl From<i64> for PropertyValue {
    fn from(n: i64) -> Self {
        PropertyValue::Integer(n)
    }
}

impl From<i32> for PropertyValue {
    fn from(n: i32) -> Self {
        PropertyValue::Integer(i64::from(n))
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

impl From<Key> for PropertyValue {
    fn from(k: Key) -> Self {
        PropertyValue::Key(k)
    }
}

impl<T: Into<PropertyValue>> From<Vec<T>> for PropertyValue {
    fn from(items: Vec<T>) -> Self {
        PropertyValue::list(items)
    }
}

impl<T: Into<PropertyValue>> From<Option<T>> for PropertyValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(PropertyValue::Null, Into::into)
    }
}

/// Declared type of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyType {
    /// Short, indexed string.
    String,
    /// Long, unindexed string.
    Text,
    /// 64-bit integer.
    Integer,
    /// Boolean.
    Boolean,
    /// Raw bytes, unindexed.
    Blob,
    /// Entity key.
    Key,
    /// Any value; used for expando properties.
    Generic,
}

impl PropertyType {
    fn accepts(self, value: &PropertyValue) -> bool {
        matches!(
            (self, value),
            (_, PropertyValue::Null)
                | (PropertyType::Generic, _)
                | (PropertyType::String | PropertyType::Text, PropertyValue::String(_))
                | (PropertyType::Integer, PropertyValue::Integer(_))
                | (PropertyType::Boolean, PropertyValue::Bool(_))
                | (PropertyType::Blob, PropertyValue::Blob(_))
                | (PropertyType::Key, PropertyValue::Key(_))
        )
    }

    fn indexed_by_default(self) -> bool {
        !matches!(self, PropertyType::Text | PropertyType::Blob)
    }
}

/// Function deriving a computed property from its entity.
pub type ComputeFn = Arc<dyn Fn(&Entity) -> PropertyValue + Send + Sync>;

/// A declared property of a model.
///
/// ```
/// use kinddb_core::Property;
///
/// let email = Property::string("email").required();
/// let tags = Property::string("tags").repeated();
/// assert!(email.is_required());
/// assert!(tags.is_repeated());
/// ```
#[derive(Clone)]
pub struct Property {
    name: String,
    kind: PropertyType,
    required: bool,
    repeated: bool,
    indexed: bool,
    default: Option<PropertyValue>,
    choices: Option<Vec<PropertyValue>>,
    compute: Option<ComputeFn>,
}

impl Property {
    /// Declares a property of the given type.
    pub fn new(name: impl Into<String>, kind: PropertyType) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            repeated: false,
            indexed: kind.indexed_by_default(),
            default: None,
            choices: None,
            compute: None,
        }
    }

    /// Declares a string property.
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::String)
    }

    /// Declares a text property.
    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Text)
    }

    /// Declares an integer property.
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Integer)
    }

    /// Declares a boolean property.
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Boolean)
    }

    /// Declares a blob property.
    pub fn blob(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Blob)
    }

    /// Declares a key property.
    pub fn key(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Key)
    }

    /// Declares an untyped property.
    pub fn generic(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Generic)
    }

    /// Declares a read-only property computed from the entity.
    pub fn computed(
        name: impl Into<String>,
        compute: impl Fn(&Entity) -> PropertyValue + Send + Sync + 'static,
    ) -> Self {
        let mut property = Self::new(name, PropertyType::Generic);
        property.compute = Some(Arc::new(compute));
        property
    }

    /// Marks the property required: `put` fails while it is unset.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Marks the property repeated: it holds a list.
    #[must_use]
    pub fn repeated(mut self) -> Self {
        self.repeated = true;
        self
    }

    /// Sets whether the property can be used in query filters.
    #[must_use]
    pub fn indexed(mut self, indexed: bool) -> Self {
        self.indexed = indexed;
        self
    }

    /// Value given to new entities.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<PropertyValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Restricts values to the given set.
    #[must_use]
    pub fn choices<T: Into<PropertyValue>>(mut self, choices: impl IntoIterator<Item = T>) -> Self {
        self.choices = Some(choices.into_iter().map(Into::into).collect());
        self
    }

    /// Property name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared type.
    pub fn property_type(&self) -> PropertyType {
        self.kind
    }

    /// Whether `put` requires a value.
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Whether the property holds a list.
    pub fn is_repeated(&self) -> bool {
        self.repeated
    }

    /// Whether queries can filter on the property.
    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    /// Whether the value is derived rather than assigned.
    pub fn is_computed(&self) -> bool {
        self.compute.is_some()
    }

    /// Value given to new entities, if declared.
    pub fn initial_value(&self) -> Option<&PropertyValue> {
        self.default.as_ref()
    }

    pub(crate) fn compute(&self, entity: &Entity) -> Option<PropertyValue> {
        self.compute.as_ref().map(|f| f(entity))
    }

    /// Checks that `value` may be assigned to this property.
    pub fn validate(&self, value: &PropertyValue) -> CoreResult<()> {
        if self.is_computed() {
            return Err(CoreError::bad_value(
                &self.name,
                "computed property cannot be assigned",
            ));
        }
        match (self.repeated, value) {
            (true, PropertyValue::List(items)) => {
                items.iter().try_for_each(|item| self.validate_scalar(item))
            }
            (true, PropertyValue::Null) => Ok(()),
            (true, other) => Err(CoreError::bad_value(
                &self.name,
                format!("repeated property expects a list, got {}", other.type_name()),
            )),
            (false, PropertyValue::List(_)) => Err(CoreError::bad_value(
                &self.name,
                "list assigned to a non-repeated property",
            )),
            (false, other) => self.validate_scalar(other),
        }
    }

    /// Checks a value used in a query filter on this property.
    pub(crate) fn validate_filter_value(&self, value: &PropertyValue) -> CoreResult<()> {
        if !self.indexed {
            return Err(CoreError::bad_argument(format!(
                "cannot filter on unindexed property {}",
                self.name
            )));
        }
        if self.is_computed() {
            return Ok(());
        }
        self.validate_scalar(value)
    }

    fn validate_scalar(&self, value: &PropertyValue) -> CoreResult<()> {
        if matches!(value, PropertyValue::List(_)) {
            return Err(CoreError::bad_value(&self.name, "lists cannot be nested"));
        }
        if !self.kind.accepts(value) {
            return Err(CoreError::bad_value(
                &self.name,
                format!("expected {:?}, got {}", self.kind, value.type_name()),
            ));
        }
        if let (true, PropertyValue::String(s)) = (self.indexed, value) {
            if s.len() > MAX_INDEXED_STRING_BYTES {
                return Err(CoreError::bad_value(
                    &self.name,
                    format!(
                        "indexed string longer than {MAX_INDEXED_STRING_BYTES} bytes; use a text property"
                    ),
                ));
            }
        }
        if let Some(choices) = &self.choices {
            if !value.is_null() && !choices.contains(value) {
                return Err(CoreError::bad_value(
                    &self.name,
                    format!("value {value:?} is not one of the allowed choices"),
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("required", &self.required)
            .field("repeated", &self.repeated)
            .field("indexed", &self.indexed)
            .field("computed", &self.is_computed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_checks() {
        let userid = Property::integer("userid");
        assert!(userid.validate(&PropertyValue::from(123)).is_ok());
        assert!(userid.validate(&PropertyValue::Null).is_ok());
        assert!(matches!(
            userid.validate(&PropertyValue::from("Sandy")),
            Err(CoreError::BadValue { .. })
        ));
        assert!(Property::string("username")
            .validate(&PropertyValue::from(42))
            .is_err());
    }

    #[test]
    fn repeated_requires_list() {
        let tags = Property::string("tags").repeated();
        assert!(tags.validate(&PropertyValue::list(["a", "b"])).is_ok());
        assert!(tags.validate(&PropertyValue::from("a")).is_err());
        assert!(tags
            .validate(&PropertyValue::List(vec![PropertyValue::list(["x"])]))
            .is_err());
        assert!(Property::string("name")
            .validate(&PropertyValue::list(["a"]))
            .is_err());
    }

    #[test]
    fn choices_and_length() {
        let color = Property::string("color").choices(["red", "blue"]);
        assert!(color.validate(&"red".into()).is_ok());
        assert!(color.validate(&"green".into()).is_err());

        let long = "x".repeat(MAX_INDEXED_STRING_BYTES + 1);
        assert!(Property::string("s").validate(&long.clone().into()).is_err());
        assert!(Property::text("t").validate(&long.into()).is_ok());
    }

    #[test]
    fn text_and_blob_default_unindexed() {
        assert!(!Property::text("body").is_indexed());
        assert!(!Property::blob("raw").is_indexed());
        assert!(Property::string("name").is_indexed());
    }

    #[test]
    fn computed_cannot_be_assigned() {
        let p = Property::computed("upper", |_| PropertyValue::Null);
        assert!(p.is_computed());
        assert!(p.validate(&"x".into()).is_err());
    }

    #[test]
    fn query_order_ranks_types() {
        let mut values = vec![
            PropertyValue::from("b"),
            PropertyValue::from(true),
            PropertyValue::from(3),
            PropertyValue::Null,
            PropertyValue::from(-1),
        ];
        values.sort_by(PropertyValue::cmp_for_query);
        assert_eq!(
            values,
            vec![
                PropertyValue::Null,
                PropertyValue::from(-1),
                PropertyValue::from(3),
                PropertyValue::from(true),
                PropertyValue::from("b"),
            ]
        );
    }

    #[test]
    fn key_values_survive_encoding() {
        let key = Key::new("Account", 5).unwrap();
        let value = PropertyValue::list([PropertyValue::Key(key), PropertyValue::Null]);
        assert_eq!(PropertyValue::from_value(&value.to_value()).unwrap(), value);
    }
}
