//! Named callables
//!
//! Schemas refer to host functions by name (`#process`, `#entity`,
//! `#merge`, computed attributes, ...). The host registers them here; the
//! builder looks them up when a node needs one.

use std::fmt;

use indexmap::IndexMap;

use crate::context::BuildContext;
use crate::entity::{read_field, EntityRef};
use crate::error::{Error, Result};
use crate::memory::MemoryEntity;
use crate::schema::Callable;
use crate::value::{self, Value};

/// Computes a value from the context
pub type TransformFn = Box<dyn Fn(&BuildContext, &[Value]) -> Result<Value>>;
/// Decides whether a node is processed
pub type PredicateFn = Box<dyn Fn(&BuildContext, &[Value]) -> Result<bool>>;
/// Loads a replacement entity; `None` means "skip"
pub type LoaderFn = Box<dyn Fn(&BuildContext, Option<&Value>, &[Value]) -> Result<Option<EntityRef>>>;
/// Collapses a sequence of field values into one
pub type MergeFn = Box<dyn Fn(&[Value], &[Value]) -> Result<Value>>;

/// Registry of named callables
#[derive(Default)]
pub struct Registry {
    transforms: IndexMap<String, TransformFn>,
    predicates: IndexMap<String, PredicateFn>,
    loaders: IndexMap<String, LoaderFn>,
    merges: IndexMap<String, MergeFn>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in callables
    ///
    /// - transforms: `boolean_to_int`, `property`, `identifier`, `field`
    /// - predicates: `field_equals`
    /// - loaders: `entity_from_value`, `entity_from_field`
    /// - merges: `join`
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_transform("boolean_to_int", boolean_to_int);
        registry.register_transform("property", property);
        registry.register_transform("identifier", |ctx, _| Ok(Value::from(ctx.entity.identifier())));
        registry.register_transform("field", field);
        registry.register_predicate("field_equals", field_equals);
        registry.register_loader("entity_from_value", entity_from_value);
        registry.register_loader("entity_from_field", entity_from_field);
        registry.register_merge("join", join);
        registry
    }

    /// Register a transform
    pub fn register_transform<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&BuildContext, &[Value]) -> Result<Value> + 'static,
    {
        self.transforms.insert(name.into(), Box::new(f));
    }

    /// Register a predicate
    pub fn register_predicate<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&BuildContext, &[Value]) -> Result<bool> + 'static,
    {
        self.predicates.insert(name.into(), Box::new(f));
    }

    /// Register an entity loader
    pub fn register_loader<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&BuildContext, Option<&Value>, &[Value]) -> Result<Option<EntityRef>> + 'static,
    {
        self.loaders.insert(name.into(), Box::new(f));
    }

    /// Register a merge function
    pub fn register_merge<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&[Value], &[Value]) -> Result<Value> + 'static,
    {
        self.merges.insert(name.into(), Box::new(f));
    }

    /// Run a transform
    pub fn transform(&self, callable: &Callable, context: &BuildContext) -> Result<Value> {
        let f = self
            .transforms
            .get(&callable.name)
            .ok_or_else(|| unknown("process function", callable))?;
        f(context, &callable.args)
    }

    /// Run a predicate
    pub fn predicate(&self, callable: &Callable, context: &BuildContext) -> Result<bool> {
        let f = self
            .predicates
            .get(&callable.name)
            .ok_or_else(|| unknown("condition", callable))?;
        f(context, &callable.args)
    }

    /// Run an entity loader
    pub fn load(&self, callable: &Callable, context: &BuildContext, value: Option<&Value>) -> Result<Option<EntityRef>> {
        let f = self
            .loaders
            .get(&callable.name)
            .ok_or_else(|| unknown("entity loader", callable))?;
        f(context, value, &callable.args)
    }

    /// Run a merge function
    pub fn merge(&self, callable: &Callable, values: &[Value]) -> Result<Value> {
        let f = self
            .merges
            .get(&callable.name)
            .ok_or_else(|| unknown("merge function", callable))?;
        f(values, &callable.args)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("transforms", &self.transforms.keys().collect::<Vec<_>>())
            .field("predicates", &self.predicates.keys().collect::<Vec<_>>())
            .field("loaders", &self.loaders.keys().collect::<Vec<_>>())
            .field("merges", &self.merges.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn unknown(kind: &str, callable: &Callable) -> Error {
    Error::SchemaConfig(format!("{} '{}' is not registered", kind, callable.name))
}

fn string_arg<'a>(args: &'a [Value], index: usize, default: &'a str) -> &'a str {
    args.get(index).and_then(Value::as_str).unwrap_or(default)
}

fn required_arg<'a>(args: &'a [Value], index: usize, function: &str) -> Result<&'a str> {
    args.get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::SchemaConfig(format!("{} expects a field name as argument {}", function, index + 1)))
}

fn first_value(context: &BuildContext, field: &str) -> Option<Value> {
    if let Some(relation) = &context.relation {
        if relation.exposes(field) {
            return read_field(relation.as_ref(), field).and_then(|v| v.into_iter().next());
        }
    }
    read_field(context.entity.as_ref(), field).and_then(|v| v.into_iter().next())
}

/// `"1"` when the value to insert is truthy, `"0"` otherwise
fn boolean_to_int(context: &BuildContext, _args: &[Value]) -> Result<Value> {
    let truthy = context.value_to_insert.as_ref().map_or(false, |v| !value::is_empty(v));
    Ok(Value::from(if truthy { "1" } else { "0" }))
}

/// Member of a composite value to insert (`value` by default)
fn property(context: &BuildContext, args: &[Value]) -> Result<Value> {
    let key = string_arg(args, 0, "value");
    Ok(match &context.value_to_insert {
        Some(Value::Object(map)) => map.get(key).cloned().unwrap_or(Value::Null),
        Some(other) => other.clone(),
        None => Value::Null,
    })
}

/// First value of another field of the current entity
fn field(context: &BuildContext, args: &[Value]) -> Result<Value> {
    let name = required_arg(args, 0, "field")?;
    Ok(first_value(context, name).unwrap_or(Value::Null))
}

/// Whether a field's first value renders as the expected text
fn field_equals(context: &BuildContext, args: &[Value]) -> Result<bool> {
    let name = required_arg(args, 0, "field_equals")?;
    let expected = args.get(1).and_then(value::to_text).unwrap_or_default();
    Ok(first_value(context, name)
        .and_then(|v| value::to_text(&value::flatten(v)))
        .map_or(false, |text| text == expected))
}

fn entity_from_composite(value: Option<&Value>, entity_type: &str) -> Result<Option<EntityRef>> {
    match value {
        Some(v @ Value::Object(_)) => Ok(Some(MemoryEntity::from_value(entity_type, v)?.into_ref())),
        Some(Value::Null) | None => Ok(None),
        Some(other) => Err(Error::EntityLoad(format!(
            "cannot load a {} entity from {}",
            entity_type,
            value::describe(other)
        ))),
    }
}

/// Entity embedded in the field value
fn entity_from_value(_context: &BuildContext, value: Option<&Value>, args: &[Value]) -> Result<Option<EntityRef>> {
    entity_from_composite(value, string_arg(args, 0, "node"))
}

/// Entity embedded in a field of the current entity
fn entity_from_field(context: &BuildContext, _value: Option<&Value>, args: &[Value]) -> Result<Option<EntityRef>> {
    let name = required_arg(args, 0, "entity_from_field")?;
    let value = first_value(context, name);
    entity_from_composite(value.as_ref(), string_arg(args, 1, "node"))
}

/// Join the text of every value with a separator (a space by default)
fn join(values: &[Value], args: &[Value]) -> Result<Value> {
    let separator = string_arg(args, 0, " ");
    let parts: Vec<String> = values
        .iter()
        .filter_map(|v| value::to_text(&value::flatten(v.clone())))
        .filter(|s| !s.is_empty())
        .collect();
    Ok(Value::from(parts.join(separator)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaNode;
    use serde_json::json;
    use std::sync::Arc;

    fn context(value: Option<Value>) -> BuildContext {
        let entity = MemoryEntity::new("node", "42")
            .with_field("status", json!(1))
            .with_field("author", json!({"id": 7, "name": "Ann"}))
            .into_ref();
        let mut ctx = BuildContext::root(entity, Arc::new(SchemaNode::new()));
        ctx.value_to_insert = value;
        ctx
    }

    #[test]
    fn test_builtin_transforms() {
        let registry = Registry::with_builtins();
        let truthy = context(Some(json!(true)));
        let falsy = context(Some(json!("")));
        assert_eq!(registry.transform(&Callable::new("boolean_to_int"), &truthy).unwrap(), json!("1"));
        assert_eq!(registry.transform(&Callable::new("boolean_to_int"), &falsy).unwrap(), json!("0"));

        let country = context(Some(json!({"iso2": "FR", "name": "France"})));
        assert_eq!(
            registry.transform(&Callable::new("property").arg("iso2"), &country).unwrap(),
            json!("FR")
        );
        assert_eq!(registry.transform(&Callable::new("identifier"), &truthy).unwrap(), json!("42"));
        assert_eq!(
            registry.transform(&Callable::new("field").arg("status"), &truthy).unwrap(),
            json!(1)
        );
    }

    #[test]
    fn test_unknown_callable_is_config_error() {
        let registry = Registry::new();
        let err = registry.transform(&Callable::new("nope"), &context(None)).unwrap_err();
        assert!(matches!(err, Error::SchemaConfig(_)));
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_field_equals() {
        let registry = Registry::with_builtins();
        let ctx = context(None);
        assert!(registry.predicate(&Callable::new("field_equals").arg("status").arg(1), &ctx).unwrap());
        assert!(!registry.predicate(&Callable::new("field_equals").arg("status").arg(2), &ctx).unwrap());
        assert!(!registry.predicate(&Callable::new("field_equals").arg("missing").arg(1), &ctx).unwrap());
    }

    #[test]
    fn test_loaders() {
        let registry = Registry::with_builtins();
        let ctx = context(None);

        let loaded = registry
            .load(&Callable::new("entity_from_value").arg("user"), &ctx, Some(&json!({"id": 3})))
            .unwrap()
            .unwrap();
        assert_eq!(loaded.entity_type(), "user");
        assert_eq!(loaded.identifier(), "3");

        let author = registry
            .load(&Callable::new("entity_from_field").arg("author").arg("user"), &ctx, None)
            .unwrap()
            .unwrap();
        assert_eq!(author.identifier(), "7");

        assert!(registry.load(&Callable::new("entity_from_value"), &ctx, None).unwrap().is_none());
        assert!(matches!(
            registry.load(&Callable::new("entity_from_value"), &ctx, Some(&json!("x"))),
            Err(Error::EntityLoad(_))
        ));
    }

    #[test]
    fn test_join() {
        let registry = Registry::with_builtins();
        let values = vec![json!("Ann"), json!({"value": "Bob"}), json!("")];
        assert_eq!(registry.merge(&Callable::new("join"), &values).unwrap(), json!("Ann Bob"));
        assert_eq!(
            registry.merge(&Callable::new("join").arg(", "), &values).unwrap(),
            json!("Ann, Bob")
        );
    }

    #[test]
    fn test_custom_registration() {
        let mut registry = Registry::new();
        registry.register_transform("upper", |ctx, _| {
            Ok(Value::from(
                ctx.value_to_insert.as_ref().and_then(Value::as_str).unwrap_or("").to_uppercase(),
            ))
        });
        let ctx = context(Some(json!("abc")));
        assert_eq!(registry.transform(&Callable::new("upper"), &ctx).unwrap(), json!("ABC"));
        assert!(format!("{:?}", registry).contains("upper"));
    }
}
