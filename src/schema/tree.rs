//! Property-bag schema format
//!
//! Schemas travel as JSON objects in which `#`-prefixed keys are
//! directives and every other key is a child tag (`tag#N` for repeated
//! siblings). The merge and compare algebra work on this form.

use indexmap::IndexMap;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Map;

use super::node::{split_numbered, AttributeValue, Callable, Condition, Restrictions, SchemaNode};
use crate::error::{Error, Result};
use crate::value::Value;

/// Directive keys of the property-bag format
pub mod keys {
    pub const MIN_OCCURS: &str = "#min_occurence";
    pub const MAX_OCCURS: &str = "#max_occurence";
    pub const ATTRIBUTES: &str = "#attributes";
    pub const VALUE: &str = "#value";
    pub const FIELD: &str = "#field";
    pub const PROCESS: &str = "#process";
    pub const ENTITY: &str = "#entity";
    pub const CHILD_ENTITY: &str = "#child_entity";
    pub const CHILD_RELATION: &str = "#child_relation";
    pub const MERGE: &str = "#merge";
    pub const CONDITION: &str = "#condition";
    pub const ERROR_INFO: &str = "#error_info";
    pub const ERROR_FIELD: &str = "#error_field";
    pub const RESTRICTIONS: &str = "#restrictions";
    pub const RAW: &str = "#raw";
    pub const COMMENT: &str = "#comment";
    // Inside callables and restrictions
    pub const CALL: &str = "#call";
    pub const ARGS: &str = "#args";
    pub const ENUMERATION: &str = "enumeration";
    pub const ATTRIBUTE_ENUMERATIONS: &str = "attributes_enumerations";
}

/// Whether a key is a directive rather than a child tag
pub fn is_directive(key: &str) -> bool {
    key.starts_with('#')
}

impl SchemaNode {
    /// Build a node from its property-bag form
    pub fn from_tree(tree: &Value) -> Result<Self> {
        let node = node_from_tree(tree, "root")?;
        node.validate("root")?;
        Ok(node)
    }

    /// Property-bag form of the node
    ///
    /// Occurrence bounds equal to the default are omitted unless they were
    /// set explicitly; repeated tags are written as `tag`, `tag#1`, `tag#2`, ...
    pub fn to_tree(&self) -> Value {
        let mut map = Map::new();

        let (explicit_min, explicit_max) = self.explicit_occurs();
        if explicit_min || self.min_occurs != 1 {
            map.insert(keys::MIN_OCCURS.into(), Value::from(self.min_occurs));
        }
        if explicit_max || self.max_occurs != 1 {
            map.insert(keys::MAX_OCCURS.into(), Value::from(self.max_occurs));
        }
        if !self.attributes.is_empty() {
            let attrs: Map<String, Value> = self
                .attributes
                .iter()
                .map(|(name, v)| (name.clone(), attribute_to_tree(v)))
                .collect();
            map.insert(keys::ATTRIBUTES.into(), Value::Object(attrs));
        }
        if let Some(v) = &self.static_value {
            map.insert(keys::VALUE.into(), v.clone());
        }
        if let Some(f) = &self.field_ref {
            map.insert(keys::FIELD.into(), Value::from(f.as_str()));
        }
        if let Some(c) = &self.process {
            map.insert(keys::PROCESS.into(), callable_to_tree(c));
        }
        if let Some(c) = &self.entity_loader {
            map.insert(keys::ENTITY.into(), callable_to_tree(c));
        }
        if let Some(c) = &self.child_entity_loader {
            map.insert(keys::CHILD_ENTITY.into(), callable_to_tree(c));
        }
        if let Some(r) = &self.child_relation {
            map.insert(keys::CHILD_RELATION.into(), Value::from(r.as_str()));
        }
        if let Some(c) = &self.merge_fn {
            map.insert(keys::MERGE.into(), callable_to_tree(c));
        }
        match &self.condition {
            Some(Condition::Field(f)) => {
                map.insert(keys::CONDITION.into(), Value::from(f.as_str()));
            }
            Some(Condition::Call(c)) => {
                // A bare string would read back as a field condition
                let mut items = vec![Value::from(c.name.as_str())];
                items.extend(c.args.iter().cloned());
                map.insert(keys::CONDITION.into(), Value::Array(items));
            }
            None => {}
        }
        if let Some(label) = &self.error_label {
            map.insert(keys::ERROR_INFO.into(), Value::from(label.as_str()));
        }
        if let Some(field) = &self.error_label_field {
            map.insert(keys::ERROR_FIELD.into(), Value::from(field.as_str()));
        }
        if let Some(r) = &self.restrictions {
            map.insert(keys::RESTRICTIONS.into(), restrictions_to_tree(r));
        }
        if self.raw_markup {
            map.insert(keys::RAW.into(), Value::Bool(true));
        }
        if let Some(comment) = &self.comment {
            map.insert(keys::COMMENT.into(), Value::from(comment.as_str()));
        }

        let mut seen: IndexMap<&str, u32> = IndexMap::new();
        for (tag, child) in self.children() {
            let count = seen.entry(tag).or_insert(0);
            let key = if *count == 0 {
                tag.to_string()
            } else {
                format!("{}#{}", tag, count)
            };
            *count += 1;
            map.insert(key, child.to_tree());
        }

        Value::Object(map)
    }

    /// Parse a schema from property-bag JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        let tree: Value = serde_json::from_str(text)?;
        Self::from_tree(&tree)
    }

    /// Pretty-printed property-bag JSON
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_tree())?)
    }
}

impl Serialize for SchemaNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_tree().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SchemaNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let tree = Value::deserialize(deserializer)?;
        SchemaNode::from_tree(&tree).map_err(D::Error::custom)
    }
}

fn config_error(path: &str, message: impl std::fmt::Display) -> Error {
    Error::SchemaConfig(format!("{}: {}", path, message))
}

fn node_from_tree(tree: &Value, path: &str) -> Result<SchemaNode> {
    let map = tree
        .as_object()
        .ok_or_else(|| config_error(path, "schema item must be an object"))?;

    let mut node = SchemaNode::new();
    for (key, value) in map {
        if !is_directive(key) {
            let (tag, _) = split_numbered(key);
            let child_path = format!("{}>{}", path, key);
            let child = node_from_tree(value, &child_path)?;
            node.push_child(tag, child);
            continue;
        }

        let at = format!("{}>{}", path, key);
        match key.as_str() {
            keys::MIN_OCCURS => {
                let min = value
                    .as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| config_error(&at, "expected a non-negative integer"))?;
                node.set_min_occurs(min);
            }
            keys::MAX_OCCURS => {
                let max = match value.as_str() {
                    Some("unbounded") => super::node::UNBOUNDED,
                    _ => value
                        .as_i64()
                        .and_then(|n| i32::try_from(n).ok())
                        .ok_or_else(|| config_error(&at, "expected an integer or \"unbounded\""))?,
                };
                node.set_max_occurs(max);
            }
            keys::ATTRIBUTES => {
                let attrs = value
                    .as_object()
                    .ok_or_else(|| config_error(&at, "expected an object"))?;
                for (name, v) in attrs {
                    if is_directive(name) {
                        continue;
                    }
                    let attr = attribute_from_tree(v, &format!("{}>{}", at, name))?;
                    node.attributes.insert(name.clone(), attr);
                }
            }
            keys::VALUE => {
                if !value.is_null() {
                    node.static_value = Some(value.clone());
                }
            }
            keys::FIELD => node.field_ref = Some(string_directive(value, &at)?),
            keys::PROCESS => node.process = Some(callable_from_tree(value, &at)?),
            keys::ENTITY => node.entity_loader = Some(callable_from_tree(value, &at)?),
            keys::CHILD_ENTITY => node.child_entity_loader = Some(callable_from_tree(value, &at)?),
            keys::CHILD_RELATION => node.child_relation = Some(string_directive(value, &at)?),
            keys::MERGE => node.merge_fn = Some(callable_from_tree(value, &at)?),
            keys::CONDITION => {
                node.condition = Some(match value {
                    Value::String(field) => Condition::Field(field.clone()),
                    other => Condition::Call(callable_from_tree(other, &at)?),
                });
            }
            keys::ERROR_INFO => node.error_label = Some(string_directive(value, &at)?),
            keys::ERROR_FIELD => node.error_label_field = Some(string_directive(value, &at)?),
            keys::RESTRICTIONS => node.restrictions = Some(restrictions_from_tree(value, &at)?),
            keys::RAW => node.raw_markup = !crate::value::is_empty(value),
            keys::COMMENT => node.comment = Some(crate::value::describe(value)),
            _ => return Err(config_error(&at, "unknown directive")),
        }
    }
    Ok(node)
}

fn string_directive(value: &Value, path: &str) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| config_error(path, "expected a string"))
}

/// Read a callable from `"name"`, `["name", args...]` or `{"#call": name, "#args": [...]}`
pub fn callable_from_tree(value: &Value, path: &str) -> Result<Callable> {
    match value {
        Value::String(name) => Ok(Callable::new(name.as_str())),
        Value::Array(items) => match items.split_first() {
            Some((Value::String(name), args)) => Ok(Callable {
                name: name.clone(),
                args: args.to_vec(),
            }),
            _ => Err(config_error(path, "callable array must start with a function name")),
        },
        Value::Object(map) => {
            let name = map
                .get(keys::CALL)
                .and_then(Value::as_str)
                .ok_or_else(|| config_error(path, "callable object needs a \"#call\" name"))?;
            let args = match map.get(keys::ARGS) {
                Some(Value::Array(args)) => args.clone(),
                Some(_) => return Err(config_error(path, "\"#args\" must be an array")),
                None => Vec::new(),
            };
            Ok(Callable {
                name: name.to_string(),
                args,
            })
        }
        _ => Err(config_error(path, "expected a callable")),
    }
}

fn callable_to_tree(callable: &Callable) -> Value {
    if callable.args.is_empty() {
        Value::from(callable.name.as_str())
    } else {
        let mut items = vec![Value::from(callable.name.as_str())];
        items.extend(callable.args.iter().cloned());
        Value::Array(items)
    }
}

fn attribute_from_tree(value: &Value, path: &str) -> Result<AttributeValue> {
    match value {
        Value::Object(map) if map.contains_key(keys::CALL) => {
            Ok(AttributeValue::Computed(callable_from_tree(value, path)?))
        }
        other => Ok(AttributeValue::Static(other.clone())),
    }
}

fn attribute_to_tree(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::Static(v) => v.clone(),
        AttributeValue::Computed(c) => {
            let mut map = Map::new();
            map.insert(keys::CALL.into(), Value::from(c.name.as_str()));
            if !c.args.is_empty() {
                map.insert(keys::ARGS.into(), Value::Array(c.args.clone()));
            }
            Value::Object(map)
        }
    }
}

fn restrictions_from_tree(value: &Value, path: &str) -> Result<Restrictions> {
    let map = value
        .as_object()
        .ok_or_else(|| config_error(path, "expected an object"))?;
    let mut restrictions = Restrictions::default();

    if let Some(values) = map.get(keys::ENUMERATION) {
        restrictions.enumeration = values
            .as_array()
            .cloned()
            .ok_or_else(|| config_error(path, "enumeration must be an array"))?;
    }
    if let Some(attrs) = map.get(keys::ATTRIBUTE_ENUMERATIONS) {
        let attrs = attrs
            .as_object()
            .ok_or_else(|| config_error(path, "attributes_enumerations must be an object"))?;
        for (name, values) in attrs {
            if is_directive(name) {
                continue;
            }
            let values = values
                .as_array()
                .cloned()
                .ok_or_else(|| config_error(path, format!("enumeration of {} must be an array", name)))?;
            restrictions.attribute_enumerations.insert(name.clone(), values);
        }
    }
    Ok(restrictions)
}

fn restrictions_to_tree(restrictions: &Restrictions) -> Value {
    let mut map = Map::new();
    if !restrictions.enumeration.is_empty() {
        map.insert(keys::ENUMERATION.into(), Value::Array(restrictions.enumeration.clone()));
    }
    if !restrictions.attribute_enumerations.is_empty() {
        let attrs: Map<String, Value> = restrictions
            .attribute_enumerations
            .iter()
            .map(|(name, values)| (name.clone(), Value::Array(values.clone())))
            .collect();
        map.insert(keys::ATTRIBUTE_ENUMERATIONS.into(), Value::Object(attrs));
    }
    Value::Object(map)
}
