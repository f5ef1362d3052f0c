//! Model schemas.
//!
//! A [`ModelSchema`] is the runtime form of a model class: its kind, its
//! declared properties and whether undeclared (expando) properties are
//! allowed. Polymorphic models share the root class's kind and record
//! their class chain in a computed `class` property.

use crate::error::{CoreError, CoreResult};
use crate::property::{Property, PropertyValue};
use crate::query::PropertyRef;
use std::sync::Arc;

/// Name of the computed property that lists a polymorphic entity's classes.
pub const CLASS_PROPERTY: &str = "class";

/// Declared shape of a model.
#[derive(Debug)]
pub struct ModelSchema {
    kind: String,
    class_chain: Vec<String>,
    properties: Vec<Property>,
    expando: bool,
    default_indexed: bool,
    polymodel: bool,
}

impl ModelSchema {
    /// Starts declaring a model stored under `kind`.
    pub fn builder(kind: impl Into<String>) -> ModelSchemaBuilder {
        let kind = kind.into();
        ModelSchemaBuilder {
            class_chain: vec![kind.clone()],
            kind,
            properties: Vec::new(),
            expando: false,
            default_indexed: true,
            polymodel: false,
        }
    }

    /// Kind entities are stored under. For a polymorphic subclass this is
    /// the root class.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Name of this class (the last element of the class chain).
    pub fn class_name(&self) -> &str {
        self.class_chain.last().map_or(&self.kind, String::as_str)
    }

    /// Classes from the root down to this one.
    pub fn class_chain(&self) -> &[String] {
        &self.class_chain
    }

    /// Whether undeclared properties may be set.
    pub fn is_expando(&self) -> bool {
        self.expando
    }

    /// Whether dynamic properties are indexed.
    pub fn default_indexed(&self) -> bool {
        self.default_indexed
    }

    /// Whether this is part of a polymorphic hierarchy.
    pub fn is_polymodel(&self) -> bool {
        self.polymodel
    }

    /// Whether this is a strict subclass in a polymorphic hierarchy.
    pub fn is_subclass(&self) -> bool {
        self.class_chain.len() > 1
    }

    /// Declared properties, inherited ones first.
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    /// Looks up a declared property.
    pub fn declared(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name() == name)
    }

    /// Returns a query handle for a declared property.
    ///
    /// Dynamic properties of expando models are not declared; name them with
    /// [`PropertyRef::generic`] instead.
    pub fn property(&self, name: &str) -> CoreResult<PropertyRef> {
        self.declared(name)
            .map(|p| PropertyRef::generic(p.name()))
            .ok_or_else(|| CoreError::unknown_property(self.class_name(), name))
    }

    /// Checks a value against the declared property, or against the rules
    /// for dynamic properties when the name is undeclared.
    pub fn validate(&self, name: &str, value: &PropertyValue) -> CoreResult<()> {
        match self.declared(name) {
            Some(property) => property.validate(value),
            None if self.expando => {
                if let PropertyValue::List(items) = value {
                    if items.iter().any(|v| matches!(v, PropertyValue::List(_))) {
                        return Err(CoreError::bad_value(name, "lists cannot be nested"));
                    }
                }
                Ok(())
            }
            None => Err(CoreError::unknown_property(self.class_name(), name)),
        }
    }
}

/// Builder returned by [`ModelSchema::builder`].
#[derive(Debug)]
pub struct ModelSchemaBuilder {
    kind: String,
    class_chain: Vec<String>,
    properties: Vec<Property>,
    expando: bool,
    default_indexed: bool,
    polymodel: bool,
}

impl ModelSchemaBuilder {
    /// Declares a property. A later declaration replaces an earlier one of
    /// the same name.
    #[must_use]
    pub fn property(mut self, property: Property) -> Self {
        self.properties.retain(|p| p.name() != property.name());
        self.properties.push(property);
        self
    }

    /// Allows undeclared properties.
    #[must_use]
    pub fn expando(mut self) -> Self {
        self.expando = true;
        self
    }

    /// Sets whether undeclared properties are indexed.
    #[must_use]
    pub fn default_indexed(mut self, indexed: bool) -> Self {
        self.default_indexed = indexed;
        self
    }

    /// Makes this the root of a polymorphic hierarchy.
    #[must_use]
    pub fn polymodel(mut self) -> Self {
        self.polymodel = true;
        self
    }

    /// Makes this a subclass of `parent`: it inherits the parent's kind,
    /// properties and expando settings, and extends its class chain.
    #[must_use]
    pub fn extends(mut self, parent: &ModelSchema) -> Self {
        let class = self.kind;
        self.kind = parent.kind.clone();
        self.class_chain = parent.class_chain.clone();
        self.class_chain.push(class);
        let own = std::mem::take(&mut self.properties);
        self.properties = parent
            .properties
            .iter()
            .filter(|p| p.name() != CLASS_PROPERTY)
            .cloned()
            .collect();
        self.expando |= parent.expando;
        self.default_indexed = parent.default_indexed;
        self.polymodel = true;
        own.into_iter().fold(self, Self::property)
    }

    /// Finishes the schema.
    pub fn build(self) -> Arc<ModelSchema> {
        let mut properties = self.properties;
        if self.polymodel {
            let chain = self.class_chain.clone();
            properties.retain(|p| p.name() != CLASS_PROPERTY);
            properties.push(
                Property::computed(CLASS_PROPERTY, move |_| PropertyValue::list(chain.clone()))
                    .repeated(),
            );
        }
        Arc::new(ModelSchema {
            kind: self.kind,
            class_chain: self.class_chain,
            properties,
            expando: self.expando,
            default_indexed: self.default_indexed,
            polymodel: self.polymodel,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_properties_only() {
        let schema = ModelSchema::builder("Account")
            .property(Property::string("username"))
            .property(Property::integer("userid"))
            .build();
        assert_eq!(schema.kind(), "Account");
        assert_eq!(schema.class_name(), "Account");
        assert!(schema.property("username").is_ok());
        assert!(matches!(
            schema.property("location"),
            Err(CoreError::UnknownProperty { .. })
        ));
        assert!(schema.validate("nickname", &"x".into()).is_err());
    }

    #[test]
    fn expando_accepts_undeclared() {
        let schema = ModelSchema::builder("Mine").expando().build();
        assert!(schema.validate("foo", &1.into()).is_ok());
        assert!(schema.validate("tags", &PropertyValue::list(["a"])).is_ok());
        // Still not queryable as a declared attribute.
        assert!(schema.property("foo").is_err());
    }

    #[test]
    fn subclass_inherits_kind_and_properties() {
        let contact = ModelSchema::builder("Contact")
            .polymodel()
            .property(Property::string("phone_number"))
            .build();
        let person = ModelSchema::builder("Person")
            .extends(&contact)
            .property(Property::string("first_name"))
            .build();

        assert_eq!(person.kind(), "Contact");
        assert_eq!(person.class_name(), "Person");
        assert_eq!(person.class_chain(), ["Contact", "Person"]);
        assert!(person.is_subclass());
        assert!(person.declared("phone_number").is_some());
        assert!(person.declared("first_name").is_some());
        assert!(person.declared(CLASS_PROPERTY).is_some_and(Property::is_computed));
        assert!(contact.declared("first_name").is_none());
    }
}
