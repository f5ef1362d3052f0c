//! Entities and typed models.

use crate::datastore::Datastore;
use crate::error::{CoreError, CoreResult};
use crate::key::{Key, KeyId};
use crate::property::{PropertyType, PropertyValue};
use crate::query::Query;
use crate::schema::ModelSchema;
use kinddb_codec::{CodecError, CodecResult, Encode, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Description of one property present on an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDescriptor {
    /// Property name.
    pub name: String,
    /// Declared type, `Generic` for dynamic properties.
    pub property_type: PropertyType,
    /// Whether the property holds a list.
    pub repeated: bool,
    /// Whether queries can filter on it.
    pub indexed: bool,
    /// True for expando properties that were not declared.
    pub dynamic: bool,
}

/// One stored object: a schema, an optional key and property values.
#[derive(Debug, Clone)]
pub struct Entity {
    schema: Arc<ModelSchema>,
    key: Option<Key>,
    values: BTreeMap<String, PropertyValue>,
}

impl Entity {
    /// Creates an entity with declared defaults applied and no key.
    pub fn new(schema: &Arc<ModelSchema>) -> Self {
        let values = schema
            .properties()
            .iter()
            .filter_map(|p| Some((p.name().to_string(), p.initial_value()?.clone())))
            .collect();
        Self {
            schema: Arc::clone(schema),
            key: None,
            values,
        }
    }

    /// Creates an entity and assigns each `(name, value)` pair, validating
    /// every value.
    pub fn with_values<K, V>(
        schema: &Arc<ModelSchema>,
        values: impl IntoIterator<Item = (K, V)>,
    ) -> CoreResult<Self>
    where
        K: Into<String>,
        V: Into<PropertyValue>,
    {
        let mut entity = Self::new(schema);
        entity.populate(values)?;
        Ok(entity)
    }

    /// Schema this entity was created with.
    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    /// Kind the entity is stored under.
    pub fn kind(&self) -> &str {
        self.schema.kind()
    }

    /// Key, if one has been assigned.
    pub fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    /// Assigns a key. Its kind must match the schema's kind.
    pub fn set_key(&mut self, key: Key) -> CoreResult<()> {
        if key.kind() != self.schema.kind() {
            return Err(CoreError::KindMismatch {
                expected: self.schema.kind().to_string(),
                actual: key.kind().to_string(),
            });
        }
        self.key = Some(key);
        Ok(())
    }

    /// Returns the entity with its key set.
    pub fn with_key(mut self, key: Key) -> CoreResult<Self> {
        self.set_key(key)?;
        Ok(self)
    }

    /// Returns the entity with its id set, keeping any parent.
    pub fn with_id(self, id: impl Into<KeyId>) -> CoreResult<Self> {
        let key = match &self.key {
            Some(key) => key.with_id(id)?,
            None => Key::new(self.schema.kind(), id)?,
        };
        self.with_key(key)
    }

    /// Returns the entity placed under `parent`, keeping any id.
    pub fn with_parent(self, parent: &Key) -> CoreResult<Self> {
        let key = Key::incomplete(self.schema.kind(), Some(parent))?;
        let key = match self.key.as_ref().and_then(Key::id) {
            Some(id) => key.with_id(id.clone())?,
            None => key,
        };
        self.with_key(key)
    }

    /// Assigns a property after validating it.
    pub fn set(&mut self, name: &str, value: impl Into<PropertyValue>) -> CoreResult<()> {
        let value = value.into();
        self.schema.validate(name, &value)?;
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    /// Assigns several properties; stops at the first invalid one.
    pub fn populate<K, V>(&mut self, values: impl IntoIterator<Item = (K, V)>) -> CoreResult<()>
    where
        K: Into<String>,
        V: Into<PropertyValue>,
    {
        for (name, value) in values {
            self.set(&name.into(), value)?;
        }
        Ok(())
    }

    /// Removes a property value. Declared properties fall back to null.
    pub fn unset(&mut self, name: &str) -> Option<PropertyValue> {
        self.values.remove(name)
    }

    /// Reads a property.
    ///
    /// Declared properties that were never set read as null (an empty list
    /// when repeated). Computed properties are evaluated. Reading a name that
    /// is neither declared nor set fails with `UnknownProperty`.
    pub fn get(&self, name: &str) -> CoreResult<PropertyValue> {
        if let Some(property) = self.schema.declared(name) {
            if let Some(value) = property.compute(self) {
                return Ok(value);
            }
            return Ok(match self.values.get(name) {
                Some(value) => value.clone(),
                None if property.is_repeated() => PropertyValue::List(Vec::new()),
                None => PropertyValue::Null,
            });
        }
        self.values
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::unknown_property(self.schema.class_name(), name))
    }

    /// Raw stored value, without defaults or computation.
    pub fn value(&self, name: &str) -> Option<&PropertyValue> {
        self.values.get(name)
    }

    /// Whether a property can be used in query filters.
    pub fn is_indexed(&self, name: &str) -> bool {
        match self.schema.declared(name) {
            Some(property) => property.is_indexed(),
            None => self.schema.default_indexed(),
        }
    }

    /// Properties present on this entity: every declared one plus any
    /// dynamic ones that have been set.
    pub fn properties(&self) -> BTreeMap<String, PropertyDescriptor> {
        let declared = self.schema.properties().iter().map(|p| PropertyDescriptor {
            name: p.name().to_string(),
            property_type: p.property_type(),
            repeated: p.is_repeated(),
            indexed: p.is_indexed(),
            dynamic: false,
        });
        let dynamic = self
            .values
            .iter()
            .filter(|(name, _)| self.schema.declared(name).is_none())
            .map(|(name, value)| PropertyDescriptor {
                name: name.clone(),
                property_type: PropertyType::Generic,
                repeated: matches!(value, PropertyValue::List(_)),
                indexed: self.schema.default_indexed(),
                dynamic: true,
            });
        declared
            .chain(dynamic)
            .map(|d| (d.name.clone(), d))
            .collect()
    }

    /// Every property value by name, computed ones included.
    pub fn to_dict(&self) -> BTreeMap<String, PropertyValue> {
        self.properties()
            .into_keys()
            .filter_map(|name| {
                let value = self.get(&name).ok()?;
                Some((name, value))
            })
            .collect()
    }

    /// Fails if a required property has no value.
    pub fn check_initialized(&self) -> CoreResult<()> {
        for property in self.schema.properties().iter().filter(|p| p.is_required()) {
            let missing = match self.values.get(property.name()) {
                None | Some(PropertyValue::Null) => true,
                Some(PropertyValue::List(items)) => items.is_empty(),
                Some(_) => false,
            };
            if missing {
                return Err(CoreError::bad_value(
                    property.name(),
                    "entity has uninitialized properties",
                ));
            }
        }
        Ok(())
    }

    /// Stored record form: class, assigned and computed values, and the
    /// names excluded from indexes.
    pub(crate) fn to_record(&self) -> Value {
        let props = self
            .to_dict()
            .into_iter()
            .filter(|(name, _)| {
                self.values.contains_key(name)
                    || self.schema.declared(name).is_some_and(|p| p.is_computed())
            })
            .map(|(name, value)| (name, value.to_value()))
            .collect::<Vec<_>>();
        let unindexed = self
            .properties()
            .into_values()
            .filter(|d| !d.indexed)
            .map(|d| Value::Text(d.name))
            .collect();
        Value::text_map([
            ("class", Value::Text(self.schema.class_name().to_string())),
            ("props", Value::text_map(props)),
            ("unindexed", Value::Array(unindexed)),
        ])
    }

    /// Rebuilds an entity from its stored record. Computed values in the
    /// record are dropped and recomputed on read.
    pub(crate) fn from_record(
        schema: &Arc<ModelSchema>,
        key: Key,
        record: &Value,
    ) -> CodecResult<Self> {
        let mut values = BTreeMap::new();
        let props = record
            .field("props")?
            .as_map()
            .ok_or_else(|| CodecError::unexpected_shape("props", "map"))?;
        for (name, value) in props {
            let name = name
                .as_text()
                .ok_or_else(|| CodecError::unexpected_shape("props", "text keys"))?;
            if schema.declared(name).is_some_and(|p| p.is_computed()) {
                continue;
            }
            values.insert(
                name.to_string(),
                <PropertyValue as kinddb_codec::Decode>::from_value(value)?,
            );
        }
        Ok(Self {
            schema: Arc::clone(schema),
            key: Some(key),
            values,
        })
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
            && self.schema.class_name() == other.schema.class_name()
            && self.values == other.values
    }
}

/// A typed model backed by an [`Entity`].
///
/// Implementors supply the schema (usually from a `OnceLock`) and a
/// wrapper; the rest of the operations come for free.
///
/// ```
/// use kinddb_core::{Datastore, Entity, Model, ModelSchema, Property};
/// use std::sync::{Arc, OnceLock};
///
/// struct Greeting(Entity);
///
/// impl Model for Greeting {
///     fn schema() -> Arc<ModelSchema> {
///         static SCHEMA: OnceLock<Arc<ModelSchema>> = OnceLock::new();
///         SCHEMA
///             .get_or_init(|| ModelSchema::builder("Greeting").property(Property::text("content")).build())
///             .clone()
///     }
///     fn wrap(entity: Entity) -> Self { Self(entity) }
///     fn entity(&self) -> &Entity { &self.0 }
///     fn entity_mut(&mut self) -> &mut Entity { &mut self.0 }
///     fn into_entity(self) -> Entity { self.0 }
/// }
///
/// let ds = Datastore::open_in_memory().unwrap();
/// let mut greeting = Greeting::new();
/// greeting.entity_mut().set("content", "hi").unwrap();
/// let key = greeting.put(&ds).unwrap();
/// assert!(Greeting::get(&ds, &key).unwrap().is_some());
/// ```
pub trait Model: Sized {
    /// Schema shared by every instance.
    fn schema() -> Arc<ModelSchema>;

    /// Wraps an entity without checking its class.
    fn wrap(entity: Entity) -> Self;

    /// Underlying entity.
    fn entity(&self) -> &Entity;

    /// Underlying entity, mutably.
    fn entity_mut(&mut self) -> &mut Entity;

    /// Unwraps the entity.
    fn into_entity(self) -> Entity;

    /// New instance with defaults and no key.
    fn new() -> Self {
        Self::wrap(Entity::new(&Self::schema()))
    }

    /// Wraps an entity whose class is this model or one of its subclasses.
    fn from_entity(entity: Entity) -> CoreResult<Self> {
        let schema = Self::schema();
        let chain = entity.schema().class_chain();
        if entity.kind() != schema.kind() || !chain.iter().any(|c| c == schema.class_name()) {
            return Err(CoreError::KindMismatch {
                expected: schema.class_name().to_string(),
                actual: entity.schema().class_name().to_string(),
            });
        }
        Ok(Self::wrap(entity))
    }

    /// Key, if assigned.
    fn key(&self) -> Option<&Key> {
        self.entity().key()
    }

    /// Stores the model, assigning an id if its key is incomplete.
    fn put(&mut self, ds: &Datastore) -> CoreResult<Key> {
        ds.put(self.entity_mut())
    }

    /// Loads a model by key.
    fn get(ds: &Datastore, key: &Key) -> CoreResult<Option<Self>> {
        ds.get_model(key)
    }

    /// Query over this model's kind, restricted to this class for
    /// polymorphic subclasses.
    fn query() -> Query {
        Query::for_schema(&Self::schema())
    }

    /// Reserves `size` ids for this kind under `parent`.
    fn allocate_ids(ds: &Datastore, size: u64, parent: Option<&Key>) -> CoreResult<(i64, i64)> {
        ds.allocate_ids(Self::schema().kind(), parent, size)
    }

    /// Reserves every id up to `max` for this kind under `parent`.
    fn allocate_ids_max(
        ds: &Datastore,
        max: i64,
        parent: Option<&Key>,
    ) -> CoreResult<(i64, i64)> {
        ds.allocate_ids_max(Self::schema().kind(), parent, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::Property;

    fn account() -> Arc<ModelSchema> {
        ModelSchema::builder("Account")
            .property(Property::string("username").required())
            .property(Property::integer("userid"))
            .property(Property::string("email"))
            .property(Property::string("tags").repeated())
            .property(Property::boolean("active").default_value(true))
            .build()
    }

    #[test]
    fn defaults_and_unset_reads() {
        let entity = Entity::new(&account());
        assert_eq!(entity.get("active").unwrap(), PropertyValue::Bool(true));
        assert_eq!(entity.get("email").unwrap(), PropertyValue::Null);
        assert_eq!(entity.get("tags").unwrap(), PropertyValue::List(vec![]));
        assert!(matches!(
            entity.get("nickname"),
            Err(CoreError::UnknownProperty { .. })
        ));
    }

    #[test]
    fn unset_falls_back_to_null() {
        let mut entity = Entity::new(&account());
        entity.set("email", "sandy@example.com").unwrap();
        assert_eq!(
            entity.unset("email"),
            Some(PropertyValue::from("sandy@example.com"))
        );
        assert_eq!(entity.get("email").unwrap(), PropertyValue::Null);
        assert_eq!(entity.unset("email"), None);
    }

    #[test]
    fn keyword_construction_validates() {
        let schema = account();
        let ok = Entity::with_values(
            &schema,
            [("username", PropertyValue::from("Sandy")), ("userid", 123.into())],
        )
        .unwrap();
        assert_eq!(ok.get("userid").unwrap(), PropertyValue::Integer(123));

        let err = Entity::with_values(&schema, [("userid", "not a number")]).unwrap_err();
        assert!(matches!(err, CoreError::BadValue { .. }));
    }

    #[test]
    fn required_is_checked() {
        let mut entity = Entity::new(&account());
        assert!(entity.check_initialized().is_err());
        entity.set("username", "Sandy").unwrap();
        assert!(entity.check_initialized().is_ok());
    }

    #[test]
    fn keys_follow_kind() {
        let entity = Entity::new(&account()).with_id("sandy@example.com").unwrap();
        assert_eq!(entity.key().unwrap().string_id(), Some("sandy@example.com"));
        let mut other = Entity::new(&account());
        assert!(matches!(
            other.set_key(Key::new("Message", 1).unwrap()),
            Err(CoreError::KindMismatch { .. })
        ));
    }

    #[test]
    fn parent_then_id_keeps_both() {
        let parent = Key::new("Group", "g").unwrap();
        let entity = Entity::new(&account())
            .with_parent(&parent)
            .unwrap()
            .with_id(5)
            .unwrap();
        let key = entity.key().unwrap();
        assert_eq!(key.parent(), Some(parent));
        assert_eq!(key.integer_id(), Some(5));
    }

    #[test]
    fn dynamic_properties_are_described() {
        let schema = ModelSchema::builder("Mine").expando().build();
        let mut entity = Entity::new(&schema);
        entity.set("foo", 1).unwrap();
        entity.set("tags", vec!["a", "b"]).unwrap();
        let props = entity.properties();
        assert_eq!(props.keys().collect::<Vec<_>>(), ["foo", "tags"]);
        assert!(props["tags"].repeated && props["tags"].dynamic);
        assert_eq!(props["foo"].property_type, PropertyType::Generic);
    }

    #[test]
    fn record_round_trip_recomputes_class() {
        let root = ModelSchema::builder("Contact").polymodel().build();
        let person = ModelSchema::builder("Person")
            .extends(&root)
            .property(Property::string("name"))
            .build();
        let entity = Entity::with_values(&person, [("name", "Ann")])
            .unwrap()
            .with_id(1)
            .unwrap();
        let record = entity.to_record();
        assert_eq!(record.text_field("class").unwrap(), "Person");

        let key = entity.key().cloned().unwrap();
        let back = Entity::from_record(&person, key, &record).unwrap();
        assert_eq!(back, entity);
        assert_eq!(
            back.get("class").unwrap(),
            PropertyValue::list(["Contact", "Person"])
        );
    }
}
