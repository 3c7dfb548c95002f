//! In-memory entities and relations
//!
//! These implement the entity capabilities for hosts without a storage
//! layer of their own, for the command line tool and for tests.

use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::entity::{Entity, EntityRef, FieldValue, Relation, RelationStore};
use crate::error::{Error, Result};
use crate::value::{self, Value};

/// Entity backed by ordered maps
#[derive(Debug, Clone, Default)]
pub struct MemoryEntity {
    entity_type: String,
    id: String,
    fields: IndexMap<String, FieldValue>,
    raw: IndexMap<String, Value>,
}

impl MemoryEntity {
    /// Create an entity without fields
    pub fn new(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: id.into(),
            fields: IndexMap::new(),
            raw: IndexMap::new(),
        }
    }

    /// Create an entity whose fields are the members of a JSON object
    ///
    /// The `id` member, when present, becomes the identifier.
    pub fn from_value(entity_type: impl Into<String>, data: &Value) -> Result<Self> {
        let object = data.as_object().ok_or_else(|| {
            Error::EntityLoad(format!("expected an object, found {}", value::describe(data)))
        })?;
        let id = object.get("id").map(value::describe).unwrap_or_default();
        let mut entity = Self::new(entity_type, id);
        for (name, v) in object {
            entity.set_field(name.clone(), v.clone());
        }
        Ok(entity)
    }

    /// Add an accessor-visible field; arrays become list-typed fields
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.set_field(name.into(), value);
        self
    }

    /// Add a field only visible through the raw record
    pub fn with_raw(mut self, name: impl Into<String>, value: Value) -> Self {
        self.raw.insert(name.into(), value);
        self
    }

    fn set_field(&mut self, name: String, value: Value) {
        let field = match value {
            Value::Array(items) => FieldValue::List(items),
            other => FieldValue::Scalar(other),
        };
        self.fields.insert(name, field);
    }

    /// Wrap into a shared handle
    pub fn into_ref(self) -> EntityRef {
        Rc::new(self)
    }
}

impl Entity for MemoryEntity {
    fn entity_type(&self) -> &str {
        &self.entity_type
    }

    fn identifier(&self) -> String {
        self.id.clone()
    }

    fn get(&self, field: &str) -> Option<FieldValue> {
        self.fields.get(field).cloned()
    }

    fn raw_field(&self, field: &str) -> Option<Value> {
        if let Some(v) = self.raw.get(field) {
            return Some(v.clone());
        }
        self.fields.get(field).map(|f| match f {
            FieldValue::Scalar(v) => v.clone(),
            FieldValue::List(items) => Value::Array(items.clone()),
        })
    }
}

/// Relation store holding relations in insertion order
#[derive(Debug, Default)]
pub struct MemoryRelationStore {
    relations: Vec<(String, Relation)>,
}

impl MemoryRelationStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a relation of the given kind
    pub fn add(&mut self, kind: impl Into<String>, relation: Relation) {
        self.relations.push((kind.into(), relation));
    }

    /// Builder-style variant of [`add`](Self::add)
    pub fn with(mut self, kind: impl Into<String>, relation: Relation) -> Self {
        self.add(kind, relation);
        self
    }

    /// Number of stored relations
    pub fn len(&self) -> usize {
        self.relations.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }
}

impl RelationStore for MemoryRelationStore {
    fn find_relations(&self, entity_type: &str, entity_id: &str, kind: &str) -> Result<Vec<Relation>> {
        Ok(self
            .relations
            .iter()
            .filter(|(k, _)| k == kind)
            .filter(|(_, r)| {
                r.endpoints
                    .iter()
                    .any(|e| e.entity_type() == entity_type && e.identifier() == entity_id)
            })
            .map(|(_, r)| r.clone())
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct EntityData {
    #[serde(rename = "type")]
    entity_type: String,
    id: Value,
    #[serde(default)]
    fields: IndexMap<String, Value>,
    #[serde(default)]
    raw: IndexMap<String, Value>,
}

impl EntityData {
    fn into_entity(self) -> MemoryEntity {
        let mut entity = MemoryEntity::new(self.entity_type, value::describe(&self.id));
        for (name, v) in self.fields {
            entity.set_field(name, v);
        }
        entity.raw = self.raw;
        entity
    }
}

#[derive(Debug, Deserialize)]
struct EntityKey {
    #[serde(rename = "type")]
    entity_type: String,
    id: Value,
}

#[derive(Debug, Deserialize)]
struct RelationData {
    kind: String,
    record: EntityData,
    endpoints: Vec<EntityKey>,
}

#[derive(Debug, Deserialize)]
struct FixtureData {
    entities: Vec<EntityData>,
    #[serde(default)]
    relations: Vec<RelationData>,
    root: EntityKey,
}

/// A root entity together with the entity graph it links into
///
/// The JSON form is either a single entity
/// (`{"type": ..., "id": ..., "fields": {...}}`) or a graph
/// (`{"entities": [...], "relations": [...], "root": {"type", "id"}}`).
#[derive(Debug)]
pub struct Fixture {
    /// Entity the document is built from
    pub root: EntityRef,
    /// Relations between the fixture's entities
    pub relations: MemoryRelationStore,
}

impl Fixture {
    /// Parse a fixture from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        let data: Value = serde_json::from_str(text)?;
        if data.get("entities").is_none() {
            let single: EntityData = serde_json::from_value(data)?;
            return Ok(Self {
                root: single.into_entity().into_ref(),
                relations: MemoryRelationStore::new(),
            });
        }

        let graph: FixtureData = serde_json::from_value(data)?;
        let mut index: HashMap<(String, String), EntityRef> = HashMap::new();
        for data in graph.entities {
            let entity = data.into_entity();
            let key = (entity.entity_type.clone(), entity.id.clone());
            index.insert(key, entity.into_ref());
        }

        let lookup = |key: &EntityKey| -> Result<EntityRef> {
            let id = value::describe(&key.id);
            index
                .get(&(key.entity_type.clone(), id.clone()))
                .cloned()
                .ok_or_else(|| Error::Relation(format!("unknown entity {}:{}", key.entity_type, id)))
        };

        let mut relations = MemoryRelationStore::new();
        for data in graph.relations {
            let endpoints = data.endpoints.iter().map(&lookup).collect::<Result<Vec<_>>>()?;
            let record = data.record.into_entity().into_ref();
            relations.add(data.kind, Relation::new(record, endpoints));
        }

        Ok(Self {
            root: lookup(&graph.root)?,
            relations,
        })
    }

    /// Load a fixture from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_entity_fields() {
        let entity = MemoryEntity::new("node", "1")
            .with_field("title", json!("Rex"))
            .with_field("tags", json!(["a", "b"]))
            .with_raw("legacy", json!("x"));

        assert_eq!(entity.get("title"), Some(FieldValue::Scalar(json!("Rex"))));
        assert!(entity.get("tags").unwrap().is_list());
        assert!(entity.get("legacy").is_none());
        assert_eq!(entity.raw_field("legacy"), Some(json!("x")));
        assert_eq!(entity.raw_field("tags"), Some(json!(["a", "b"])));
        assert!(entity.exposes("legacy"));
        assert!(!entity.exposes("missing"));
    }

    #[test]
    fn test_from_value() {
        let entity = MemoryEntity::from_value("user", &json!({"id": 7, "name": "Ann"})).unwrap();
        assert_eq!(entity.identifier(), "7");
        assert_eq!(entity.get("name"), Some(FieldValue::Scalar(json!("Ann"))));
        assert!(MemoryEntity::from_value("user", &json!("Ann")).is_err());
    }

    #[test]
    fn test_store_filters_kind_and_endpoint() {
        let a = MemoryEntity::new("node", "1").into_ref();
        let b = MemoryEntity::new("node", "2").into_ref();
        let c = MemoryEntity::new("node", "3").into_ref();
        let store = MemoryRelationStore::new()
            .with("parent", Relation::new(MemoryEntity::new("relation", "r1").into_ref(), vec![a.clone(), b]))
            .with("sibling", Relation::new(MemoryEntity::new("relation", "r2").into_ref(), vec![a.clone(), c.clone()]))
            .with("parent", Relation::new(MemoryEntity::new("relation", "r3").into_ref(), vec![c, a]));

        let found = store.find_relations("node", "1", "parent").unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].record.identifier(), "r1");
        assert_eq!(found[1].record.identifier(), "r3");
        assert!(store.find_relations("node", "2", "sibling").unwrap().is_empty());
    }

    #[test]
    fn test_fixture_single_entity() {
        let fixture = Fixture::from_json(r#"{"type": "node", "id": 1, "fields": {"name": "Rex"}}"#).unwrap();
        assert_eq!(fixture.root.identifier(), "1");
        assert!(fixture.relations.is_empty());
    }

    #[test]
    fn test_fixture_graph() {
        let text = r#"{
            "entities": [
                {"type": "node", "id": "a", "fields": {"name": "A"}},
                {"type": "node", "id": "b", "fields": {"name": "B"}}
            ],
            "relations": [
                {"kind": "parent", "record": {"type": "relation", "id": "r", "fields": {"role": "x"}},
                 "endpoints": [{"type": "node", "id": "a"}, {"type": "node", "id": "b"}]}
            ],
            "root": {"type": "node", "id": "a"}
        }"#;
        let fixture = Fixture::from_json(text).unwrap();
        assert_eq!(fixture.root.identifier(), "a");
        assert_eq!(fixture.relations.len(), 1);
    }

    #[test]
    fn test_fixture_unknown_endpoint() {
        let text = r#"{
            "entities": [{"type": "node", "id": "a"}],
            "relations": [{"kind": "k", "record": {"type": "relation", "id": "r"},
                           "endpoints": [{"type": "node", "id": "zz"}]}],
            "root": {"type": "node", "id": "a"}
        }"#;
        assert!(matches!(Fixture::from_json(text), Err(Error::Relation(_))));
    }
}
