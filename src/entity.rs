//! Entity access capability
//!
//! The storage layer lives outside this crate. The builder only sees
//! entities through the [`Entity`] trait and relations through
//! [`RelationStore`].

use std::fmt;
use std::rc::Rc;

use crate::error::Result;
use crate::value::Value;

/// Shared handle to an entity
pub type EntityRef = Rc<dyn Entity>;

/// Value of a field as reported by an accessor
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Single-valued field
    Scalar(Value),
    /// Multi-valued field, in delta order
    List(Vec<Value>),
}

impl FieldValue {
    /// Whether the accessor reports the field as list-typed
    pub fn is_list(&self) -> bool {
        matches!(self, FieldValue::List(_))
    }

    /// Normalize into a sequence with empty entries removed
    pub fn into_values(self) -> Vec<Value> {
        match self {
            FieldValue::Scalar(v) => non_empty(vec![v]),
            FieldValue::List(values) => non_empty(values),
        }
    }
}

/// Normalize a raw record value into a sequence
///
/// Arrays are multi-valued fields; anything else (including objects, which
/// are single composite values) is a single value.
pub fn raw_values(value: Value) -> Vec<Value> {
    match value {
        Value::Array(values) => non_empty(values),
        other => non_empty(vec![other]),
    }
}

fn non_empty(values: Vec<Value>) -> Vec<Value> {
    values.into_iter().filter(|v| !crate::value::is_empty(v)).collect()
}

/// Read-only accessor over one entity
pub trait Entity: fmt::Debug {
    /// Entity type name (`node`, `user`, `relation`, ...)
    fn entity_type(&self) -> &str;

    /// Identifier, unique within the entity type
    fn identifier(&self) -> String;

    /// Read a field through the accessor
    ///
    /// Returns `None` when the accessor does not expose the field.
    fn get(&self, field: &str) -> Option<FieldValue>;

    /// Low-level read against the underlying record
    fn raw_field(&self, field: &str) -> Option<Value>;

    /// Whether the entity's own data exposes the field
    fn exposes(&self, field: &str) -> bool {
        self.get(field).is_some() || self.raw_field(field).is_some()
    }

    /// Whether two handles point at the same stored entity
    fn same_as(&self, other: &dyn Entity) -> bool {
        self.entity_type() == other.entity_type() && self.identifier() == other.identifier()
    }
}

/// Read a field through the accessor, falling back to the raw record
///
/// Returns `None` when neither knows the field; empty values are removed.
pub fn read_field(entity: &dyn Entity, field: &str) -> Option<Vec<Value>> {
    match entity.get(field) {
        Some(value) => Some(value.into_values()),
        None => entity.raw_field(field).map(raw_values),
    }
}

/// A typed link between endpoint entities, itself bearing fields
#[derive(Debug, Clone)]
pub struct Relation {
    /// The relation record
    pub record: EntityRef,
    /// Endpoints, in stored order
    pub endpoints: Vec<EntityRef>,
}

impl Relation {
    /// Create a new relation
    pub fn new(record: EntityRef, endpoints: Vec<EntityRef>) -> Self {
        Self { record, endpoints }
    }

    /// Endpoints other than the given subject
    pub fn others<'a>(&'a self, subject: &'a dyn Entity) -> impl Iterator<Item = &'a EntityRef> + 'a {
        self.endpoints.iter().filter(move |e| !e.same_as(subject))
    }
}

/// Relation-graph query capability
pub trait RelationStore {
    /// Relations of the given kind having the entity as an endpoint
    fn find_relations(&self, entity_type: &str, entity_id: &str, kind: &str) -> Result<Vec<Relation>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryEntity;
    use serde_json::json;

    #[test]
    fn test_field_value_normalization() {
        assert_eq!(FieldValue::Scalar(json!("Rex")).into_values(), vec![json!("Rex")]);
        assert!(FieldValue::Scalar(json!("")).into_values().is_empty());
        assert_eq!(
            FieldValue::List(vec![json!("a"), json!(null), json!("b"), json!(0)]).into_values(),
            vec![json!("a"), json!("b")]
        );
    }

    #[test]
    fn test_raw_values() {
        assert_eq!(raw_values(json!(["x", ""])), vec![json!("x")]);
        assert_eq!(raw_values(json!({"uri": "a"})), vec![json!({"uri": "a"})]);
        assert!(raw_values(json!(null)).is_empty());
    }

    #[test]
    fn test_read_field_falls_back_to_raw() {
        let entity = MemoryEntity::new("node", "1")
            .with_field("tags", json!(["a", "", "b"]))
            .with_raw("legacy", json!({"value": "x"}));
        assert_eq!(read_field(&entity, "tags"), Some(vec![json!("a"), json!("b")]));
        assert_eq!(read_field(&entity, "legacy"), Some(vec![json!({"value": "x"})]));
        assert_eq!(read_field(&entity, "missing"), None);
    }

    #[test]
    fn test_relation_others_excludes_subject() {
        let a: EntityRef = Rc::new(MemoryEntity::new("node", "1"));
        let b: EntityRef = Rc::new(MemoryEntity::new("node", "2"));
        let record: EntityRef = Rc::new(MemoryEntity::new("relation", "10"));
        let relation = Relation::new(record, vec![a.clone(), b.clone()]);

        let others: Vec<_> = relation.others(a.as_ref()).collect();
        assert_eq!(others.len(), 1);
        assert_eq!(others[0].identifier(), "2");
    }
}
