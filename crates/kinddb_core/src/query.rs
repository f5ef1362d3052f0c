//! Queries over stored entities.

use crate::error::{CoreError, CoreResult};
use crate::key::Key;
use crate::model::Entity;
use crate::property::PropertyValue;
use crate::schema::{ModelSchema, CLASS_PROPERTY};
use std::cmp::Ordering;

/// Comparison applied by a [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// Membership in a list of values.
    In,
}

/// A property condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    property: String,
    op: FilterOp,
    value: PropertyValue,
}

impl Filter {
    /// Creates a filter. For [`FilterOp::In`] the value must be a list.
    pub fn new(property: impl Into<String>, op: FilterOp, value: impl Into<PropertyValue>) -> Self {
        Self {
            property: property.into(),
            op,
            value: value.into(),
        }
    }

    /// Filtered property.
    pub fn property(&self) -> &str {
        &self.property
    }

    /// Comparison.
    pub fn op(&self) -> FilterOp {
        self.op
    }

    /// Compared value.
    pub fn value(&self) -> &PropertyValue {
        &self.value
    }

    fn operands(&self) -> CoreResult<&[PropertyValue]> {
        match (self.op, &self.value) {
            (FilterOp::In, PropertyValue::List(items)) => Ok(items),
            (FilterOp::In, _) => Err(CoreError::bad_argument(format!(
                "IN filter on {} needs a list of values",
                self.property
            ))),
            (_, PropertyValue::List(_)) => Err(CoreError::bad_argument(format!(
                "filter on {} compares against a list",
                self.property
            ))),
            (_, value) => Ok(std::slice::from_ref(value)),
        }
    }

    fn matches(&self, entity: &Entity) -> bool {
        let Some(values) = indexed_values(entity, &self.property) else {
            return false;
        };
        values.iter().any(|v| self.matches_value(v))
    }

    fn matches_value(&self, v: &PropertyValue) -> bool {
        let target = &self.value;
        let ordered = |accept: fn(Ordering) -> bool| {
            v.same_type(target) && accept(v.cmp_for_query(target))
        };
        match self.op {
            FilterOp::Eq => v == target,
            FilterOp::Ne => ordered(Ordering::is_ne),
            FilterOp::Lt => ordered(Ordering::is_lt),
            FilterOp::Le => ordered(Ordering::is_le),
            FilterOp::Gt => ordered(Ordering::is_gt),
            FilterOp::Ge => ordered(Ordering::is_ge),
            FilterOp::In => target.as_list().is_some_and(|items| items.contains(v)),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Smallest first.
    Asc,
    /// Largest first.
    Desc,
}

/// A sort order on one property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    property: String,
    direction: Direction,
}

impl Order {
    /// Creates a sort order.
    pub fn new(property: impl Into<String>, direction: Direction) -> Self {
        Self {
            property: property.into(),
            direction,
        }
    }

    /// Sort value of an entity: the smallest element ascending, the largest
    /// descending.
    fn sort_value(&self, entity: &Entity) -> Option<PropertyValue> {
        let values = indexed_values(entity, &self.property)?.into_iter();
        match self.direction {
            Direction::Asc => values.min_by(PropertyValue::cmp_for_query),
            Direction::Desc => values.max_by(PropertyValue::cmp_for_query),
        }
    }
}

/// Names a property in filters and sort orders.
///
/// Declared properties come from [`ModelSchema::property`]; dynamic ones
/// from [`PropertyRef::generic`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyRef {
    name: String,
}

impl PropertyRef {
    /// Names any property, declared or not.
    pub fn generic(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Property name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `property == value`
    pub fn equal(&self, value: impl Into<PropertyValue>) -> Filter {
        Filter::new(&self.name, FilterOp::Eq, value)
    }

    /// `property != value`
    pub fn not_equal(&self, value: impl Into<PropertyValue>) -> Filter {
        Filter::new(&self.name, FilterOp::Ne, value)
    }

    /// `property < value`
    pub fn less_than(&self, value: impl Into<PropertyValue>) -> Filter {
        Filter::new(&self.name, FilterOp::Lt, value)
    }

    /// `property <= value`
    pub fn less_or_equal(&self, value: impl Into<PropertyValue>) -> Filter {
        Filter::new(&self.name, FilterOp::Le, value)
    }

    /// `property > value`
    pub fn greater_than(&self, value: impl Into<PropertyValue>) -> Filter {
        Filter::new(&self.name, FilterOp::Gt, value)
    }

    /// `property >= value`
    pub fn greater_or_equal(&self, value: impl Into<PropertyValue>) -> Filter {
        Filter::new(&self.name, FilterOp::Ge, value)
    }

    /// `property IN values`
    pub fn in_values<T: Into<PropertyValue>>(&self, values: impl IntoIterator<Item = T>) -> Filter {
        Filter::new(&self.name, FilterOp::In, PropertyValue::list(values))
    }

    /// Ascending order on this property.
    pub fn asc(&self) -> Order {
        Order::new(&self.name, Direction::Asc)
    }

    /// Descending order on this property.
    pub fn desc(&self) -> Order {
        Order::new(&self.name, Direction::Desc)
    }
}

/// Values of `name` visible to filters, or `None` if the property is
/// unindexed or absent. A repeated property contributes each element.
fn indexed_values(entity: &Entity, name: &str) -> Option<Vec<PropertyValue>> {
    if !entity.is_indexed(name) {
        return None;
    }
    let computed = entity.schema().declared(name).is_some_and(|p| p.is_computed());
    let value = if computed {
        entity.get(name).ok()?
    } else {
        entity.value(name)?.clone()
    };
    match value {
        PropertyValue::List(items) if items.is_empty() => None,
        PropertyValue::List(items) => Some(items),
        scalar => Some(vec![scalar]),
    }
}

/// A query over one kind (or every kind).
///
/// ```
/// use kinddb_core::{PropertyRef, Query};
///
/// let query = Query::new("Employee")
///     .filter(PropertyRef::generic("location").equal("SF"))
///     .order(PropertyRef::generic("name").asc())
///     .limit(10);
/// assert_eq!(query.kind(), Some("Employee"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    kind: Option<String>,
    ancestor: Option<Key>,
    filters: Vec<Filter>,
    orders: Vec<Order>,
    class: Option<String>,
    limit: Option<usize>,
    offset: usize,
}

impl Query {
    /// Query over entities of `kind`.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            ..Self::default()
        }
    }

    /// Query over entities of every kind.
    pub fn kindless() -> Self {
        Self::default()
    }

    /// Query over a model's kind. A polymorphic subclass adds a filter on
    /// its class.
    pub fn for_schema(schema: &ModelSchema) -> Self {
        let query = Self {
            class: Some(schema.class_name().to_string()),
            ..Self::new(schema.kind())
        };
        if schema.is_subclass() {
            query.filter(PropertyRef::generic(CLASS_PROPERTY).equal(schema.class_name()))
        } else {
            query
        }
    }

    /// Restricts results to `ancestor` and its descendants.
    #[must_use]
    pub fn ancestor(mut self, ancestor: Key) -> Self {
        self.ancestor = Some(ancestor);
        self
    }

    /// Adds a filter. All filters must match.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Adds a sort order after any existing ones.
    #[must_use]
    pub fn order(mut self, order: Order) -> Self {
        self.orders.push(order);
        self
    }

    /// Returns at most `limit` results.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips the first `offset` results.
    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Kind queried, or `None` for a kindless query.
    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    /// Ancestor restriction, if any.
    pub fn ancestor_key(&self) -> Option<&Key> {
        self.ancestor.as_ref()
    }

    /// Filters, in the order added.
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Model class the query was built for, if any.
    pub fn class(&self) -> Option<&str> {
        self.class.as_deref()
    }

    /// Checks filter values against the declared properties of `schema`.
    pub fn validate(&self, schema: &ModelSchema) -> CoreResult<()> {
        for filter in &self.filters {
            let operands = filter.operands()?;
            match schema.declared(&filter.property) {
                Some(property) => {
                    for value in operands {
                        property.validate_filter_value(value)?;
                    }
                }
                None if schema.is_expando() => {}
                None => {
                    return Err(CoreError::unknown_property(
                        schema.class_name(),
                        &filter.property,
                    ))
                }
            }
        }
        Ok(())
    }

    /// Whether `entity` passes the kind, ancestor and property filters.
    pub fn matches(&self, entity: &Entity) -> bool {
        let Some(key) = entity.key() else {
            return false;
        };
        if self.kind.as_deref().is_some_and(|kind| kind != key.kind()) {
            return false;
        }
        if self.ancestor.as_ref().is_some_and(|a| !a.is_ancestor_of(key)) {
            return false;
        }
        self.filters.iter().all(|f| f.matches(entity))
    }

    /// Filters, sorts and pages `candidates`.
    pub(crate) fn apply(&self, candidates: Vec<Entity>) -> CoreResult<Vec<Entity>> {
        for filter in &self.filters {
            filter.operands()?;
        }

        let mut rows: Vec<(Vec<PropertyValue>, Entity)> = candidates
            .into_iter()
            .filter(|e| self.matches(e))
            .filter_map(|e| {
                let sort_values = self
                    .orders
                    .iter()
                    .map(|o| o.sort_value(&e))
                    .collect::<Option<Vec<_>>>()?;
                Some((sort_values, e))
            })
            .collect();

        rows.sort_by(|(a, ea), (b, eb)| {
            self.orders
                .iter()
                .zip(a.iter().zip(b))
                .map(|(order, (x, y))| match order.direction {
                    Direction::Asc => x.cmp_for_query(y),
                    Direction::Desc => y.cmp_for_query(x),
                })
                .find(|o| o.is_ne())
                .unwrap_or_else(|| ea.key().cmp(&eb.key()))
        });

        let rows = rows.into_iter().map(|(_, e)| e).skip(self.offset);
        Ok(match self.limit {
            Some(limit) => rows.take(limit).collect(),
            None => rows.collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::Property;
    use std::sync::Arc;

    fn schema() -> Arc<ModelSchema> {
        ModelSchema::builder("Employee")
            .expando()
            .property(Property::string("name"))
            .property(Property::integer("age"))
            .property(Property::text("bio"))
            .build()
    }

    fn employee(id: i64, name: &str, age: i64, tags: &[&str]) -> Entity {
        let mut e = Entity::with_values(
            &schema(),
            [("name", PropertyValue::from(name)), ("age", age.into())],
        )
        .unwrap()
        .with_id(id)
        .unwrap();
        if !tags.is_empty() {
            e.set("tags", tags.to_vec()).unwrap();
        }
        e.set("bio", "long text").unwrap();
        e
    }

    fn names(rows: &[Entity]) -> Vec<String> {
        rows.iter()
            .map(|e| e.get("name").unwrap().as_str().unwrap().to_string())
            .collect()
    }

    fn staff() -> Vec<Entity> {
        vec![
            employee(1, "Cleo", 41, &["sf", "remote"]),
            employee(2, "Ann", 29, &[]),
            employee(3, "Bo", 35, &["nyc"]),
        ]
    }

    #[test]
    fn default_order_is_by_key() {
        let rows = Query::new("Employee").apply(staff()).unwrap();
        assert_eq!(names(&rows), ["Cleo", "Ann", "Bo"]);
    }

    #[test]
    fn inequality_and_order() {
        let age = PropertyRef::generic("age");
        let rows = Query::new("Employee")
            .filter(age.greater_or_equal(30))
            .order(age.desc())
            .apply(staff())
            .unwrap();
        assert_eq!(names(&rows), ["Cleo", "Bo"]);
    }

    #[test]
    fn repeated_matches_any_element() {
        let tags = PropertyRef::generic("tags");
        let rows = Query::new("Employee")
            .filter(tags.equal("remote"))
            .apply(staff())
            .unwrap();
        assert_eq!(names(&rows), ["Cleo"]);

        let rows = Query::new("Employee")
            .filter(tags.in_values(["nyc", "sf"]))
            .apply(staff())
            .unwrap();
        assert_eq!(names(&rows), ["Cleo", "Bo"]);
    }

    #[test]
    fn missing_and_unindexed_never_match() {
        let rows = Query::new("Employee")
            .filter(PropertyRef::generic("bio").equal("long text"))
            .apply(staff())
            .unwrap();
        assert!(rows.is_empty());

        // Ann has no tags, so ordering by tags drops her.
        let rows = Query::new("Employee")
            .order(PropertyRef::generic("tags").asc())
            .apply(staff())
            .unwrap();
        assert_eq!(names(&rows), ["Bo", "Cleo"]);
    }

    #[test]
    fn inequality_ignores_other_types() {
        let rows = Query::new("Employee")
            .filter(PropertyRef::generic("name").greater_than(0))
            .apply(staff())
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn not_equal_is_less_or_greater() {
        let name = PropertyRef::generic("name");
        let run = |filter: Filter| Query::new("Employee").filter(filter).apply(staff()).unwrap();
        assert!(run(name.not_equal(0)).is_empty());
        assert!(run(name.less_than(0)).is_empty());
        assert!(run(name.greater_than(0)).is_empty());
        assert_eq!(names(&run(name.not_equal("Ann"))), ["Cleo", "Bo"]);
    }

    #[test]
    fn ancestor_includes_itself() {
        let root = Key::new("Employee", 1).unwrap();
        let child = employee(9, "Kid", 5, &[]).with_parent(&root).unwrap();
        let mut all = staff();
        all.push(child);
        let rows = Query::new("Employee").ancestor(root).apply(all).unwrap();
        assert_eq!(names(&rows), ["Cleo", "Kid"]);
    }

    #[test]
    fn offset_and_limit() {
        let rows = Query::new("Employee")
            .order(PropertyRef::generic("name").asc())
            .offset(1)
            .limit(1)
            .apply(staff())
            .unwrap();
        assert_eq!(names(&rows), ["Bo"]);
    }

    #[test]
    fn validate_checks_declared_types() {
        let schema = schema();
        let bad = Query::new("Employee").filter(schema.property("age").unwrap().equal("old"));
        assert!(matches!(bad.validate(&schema), Err(CoreError::BadValue { .. })));
        let unindexed = Query::new("Employee").filter(schema.property("bio").unwrap().equal("x"));
        assert!(unindexed.validate(&schema).is_err());
        let dynamic = Query::new("Employee").filter(PropertyRef::generic("location").equal("SF"));
        assert!(dynamic.validate(&schema).is_ok());
        let not_list = Query::new("Employee").filter(Filter::new("age", FilterOp::In, 3));
        assert!(not_list.validate(&schema).is_err());
    }
}
