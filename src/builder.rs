//! Document builder
//!
//! Walks a schema tree depth-first and emits one XML element per resolved
//! occurrence of each node. Values come from the fields of the entity in
//! the current context frame, or from the relation the frame carries.
//!
//! Each node is processed in the same order:
//!
//! 1. a frame is pushed for the node
//! 2. `#entity` may swap the entity (or skip the node)
//! 3. `#condition` may skip the node
//! 4. occurrences are resolved from `#child_relation` or `#field`
//! 5. the occurrence count is checked against the node's bounds
//! 6. elements are inserted and the children processed for each occurrence
//!
//! Elements are built as owned values and only attached to their parent
//! once their subtree is done, so an optional element whose subtree
//! produced nothing is simply never attached.

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use serde::Deserialize;

use crate::context::{BuildContext, ContextStack, ValueOccurrence};
use crate::documents::{Document, Element, Node};
use crate::entities;
use crate::entity::{read_field, EntityRef, RelationStore};
use crate::error::{ConstraintError, Error, Result};
use crate::limits::Limits;
use crate::modifiers::Modifier;
use crate::registry::Registry;
use crate::schema::{AttributeValue, Condition, SchemaNode};
use crate::validation::{validate_document, XsdValidator};
use crate::value::{self, Value};

/// Options controlling error handling during a build
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    /// Insert one empty element in place of a required field that has no value
    #[serde(alias = "force-empty-values")]
    pub force_empty_values: bool,
    /// Log occurrence and missing-field errors instead of failing
    #[serde(alias = "no-error")]
    pub suppress_errors: bool,
    /// Do not validate the generated document
    pub skip_validation: bool,
    /// Resource limits
    pub limits: Limits,
}

impl BuildOptions {
    /// Create options with everything disabled
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `force_empty_values`
    pub fn with_force_empty_values(mut self, force: bool) -> Self {
        self.force_empty_values = force;
        self
    }

    /// Set `suppress_errors`
    pub fn with_suppress_errors(mut self, suppress: bool) -> Self {
        self.suppress_errors = suppress;
        self
    }

    /// Set `skip_validation`
    pub fn with_skip_validation(mut self, skip: bool) -> Self {
        self.skip_validation = skip;
        self
    }

    /// Set the limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Whether the generated document goes through the validator
    ///
    /// Validation never runs when errors are suppressed.
    pub fn validation_enabled(&self) -> bool {
        !self.skip_validation && !self.suppress_errors
    }
}

/// Mutable state of one build
struct Walk {
    stack: ContextStack,
    path: Vec<String>,
}

impl Walk {
    fn path(&self) -> String {
        self.path.join(">")
    }

    fn current(&self) -> &BuildContext {
        self.stack.current()
    }
}

/// Builds XML documents from entities
pub struct Builder {
    name: String,
    schema: Arc<SchemaNode>,
    options: BuildOptions,
    registry: Registry,
    modifiers: Vec<Box<dyn Modifier>>,
    relations: Option<Rc<dyn RelationStore>>,
    validator: Option<(Box<dyn XsdValidator>, String)>,
    warnings: Vec<String>,
}

impl Builder {
    /// Create a builder using the built-in callables
    ///
    /// `name` identifies the document in error messages.
    pub fn new(name: impl Into<String>, schema: Arc<SchemaNode>, options: BuildOptions) -> Self {
        Self {
            name: name.into(),
            schema,
            options,
            registry: Registry::with_builtins(),
            modifiers: Vec::new(),
            relations: None,
            validator: None,
            warnings: Vec::new(),
        }
    }

    /// Replace the callable registry
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Add a modifier; modifiers run in the order they were added
    pub fn with_modifier(mut self, modifier: Box<dyn Modifier>) -> Self {
        self.modifiers.push(modifier);
        self
    }

    /// Set the relation store used by `#child_relation`
    pub fn with_relations(mut self, relations: Rc<dyn RelationStore>) -> Self {
        self.relations = Some(relations);
        self
    }

    /// Validate generated documents against `schema_url`
    pub fn with_validator(mut self, validator: Box<dyn XsdValidator>, schema_url: impl Into<String>) -> Self {
        self.validator = Some((validator, schema_url.into()));
        self
    }

    /// Warnings recorded by the last build
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Build the XML document for `root`
    pub fn build(&mut self, root: EntityRef) -> Result<String> {
        self.warnings.clear();
        tracing::debug!(
            document = %self.name,
            entity_type = root.entity_type(),
            entity_id = %root.identifier(),
            "building XML"
        );

        let mut document = Document::new();
        for modifier in &mut self.modifiers {
            modifier.on_build_start(&self.schema, &root, &mut document);
        }

        let schema = self.schema.clone();
        let mut walk = Walk {
            stack: ContextStack::new(BuildContext::root(root.clone(), schema.clone())),
            path: Vec::new(),
        };
        let mut container = Element::new("");
        self.build_children(&mut walk, &schema, root, &mut container)?;

        for node in container.children {
            if let Node::Element(element) = node {
                document.set_root(element)?;
            }
        }

        let xml = document.to_xml()?;
        if self.options.validation_enabled() {
            if let Some((validator, schema_url)) = &self.validator {
                validate_document(validator.as_ref(), &xml, schema_url)?;
            }
        }

        tracing::debug!(document = %self.name, warnings = self.warnings.len(), "XML built");
        Ok(xml)
    }

    fn warn(&mut self, message: String) {
        tracing::warn!(document = %self.name, "{}", message);
        self.warnings.push(message);
    }

    /// Turn a suppressible error into a warning when errors are suppressed
    fn recover(&mut self, err: Error) -> Result<()> {
        if self.options.suppress_errors && err.is_suppressible() {
            self.warn(format!("The following error happened but was ignored due to settings: {}", err));
            Ok(())
        } else {
            Err(err)
        }
    }

    /// Process the children of `node` with `entity`; true when real content was inserted
    fn build_children(
        &mut self,
        walk: &mut Walk,
        node: &SchemaNode,
        entity: EntityRef,
        parent: &mut Element,
    ) -> Result<bool> {
        let mut inserted = false;
        for (tag, child) in node.children() {
            walk.path.push(tag.to_string());
            self.options.limits.check_depth(walk.stack.depth() + 1, &walk.path())?;

            let frame = walk.current().enter(tag, entity.clone(), child.clone());
            walk.stack.push(frame);
            let result = self.build_node(walk, tag, child.clone(), parent);
            walk.stack.pop();
            walk.path.pop();

            inserted |= result?;
        }
        Ok(inserted)
    }

    fn build_node(&mut self, walk: &mut Walk, tag: &str, mut node: Arc<SchemaNode>, parent: &mut Element) -> Result<bool> {
        node.check_directives(&walk.path())?;

        if let Some(loader) = &node.entity_loader {
            match self.registry.load(loader, walk.current(), None) {
                Ok(Some(entity)) => {
                    let frame = walk.current().clone().with_entity(entity);
                    walk.stack.pop();
                    walk.stack.push(frame);
                }
                Ok(None) => return Ok(false),
                Err(err @ Error::SchemaConfig(_)) => return Err(err),
                Err(err) => {
                    self.warn(format!("Could not load entity at {}: {}", walk.path(), err));
                    return Ok(false);
                }
            }
        }

        match &node.condition {
            Some(Condition::Field(field)) => {
                if self.read_values(walk, field)?.is_empty() {
                    return Ok(false);
                }
            }
            Some(Condition::Call(predicate)) => {
                if !self.registry.predicate(predicate, walk.current())? {
                    return Ok(false);
                }
            }
            None => {}
        }

        let mut occurrences = if let Some(kind) = &node.child_relation {
            Some(self.relation_occurrences(walk, kind)?)
        } else if let Some(field) = &node.field_ref {
            Some(self.field_occurrences(walk, tag, &node, field)?)
        } else {
            None
        };

        if let Some(count) = occurrences.as_ref().map(Vec::len) {
            self.options.limits.check_occurrences(count, &walk.path())?;
            if !node.accepts_count(count) {
                let err = self.constraint_error(walk, &node, count);
                if self.options.force_empty_values && count == 0 {
                    self.warn(format!(
                        "The following error happened but was ignored due to settings, and an empty value was set in its place: {}",
                        err
                    ));
                    let working = Arc::make_mut(&mut node);
                    working.static_value = Some(Value::from(""));
                    working.field_ref = None;
                    working.child_relation = None;
                    walk.stack.modify(|frame| frame.schema = Some(node.clone()));
                    occurrences = None;
                } else {
                    self.recover(err.into())?;
                    return Ok(false);
                }
            }
        }

        if node.field_ref.is_some() {
            self.insert_field(walk, tag, &node, occurrences.unwrap_or_default(), parent)
        } else if let Some(static_value) = node.static_value.clone() {
            self.insert_repeated(walk, tag, &node, occurrences, Some(static_value), parent)
        } else {
            self.insert_repeated(walk, tag, &node, occurrences, None, parent)
        }
    }

    /// One occurrence per endpoint of each relation of `kind`, other than the subject
    fn relation_occurrences(&mut self, walk: &Walk, kind: &str) -> Result<Vec<ValueOccurrence>> {
        let store = self.relations.as_ref().ok_or_else(|| {
            Error::Relation(format!(
                "no relation store available for #child_relation '{}' at {}",
                kind,
                walk.path()
            ))
        })?;
        let subject = &walk.current().entity;
        let relations = store.find_relations(subject.entity_type(), &subject.identifier(), kind)?;

        let mut occurrences = Vec::new();
        for relation in &relations {
            for endpoint in relation.others(subject.as_ref()) {
                let occurrence = ValueOccurrence::new(occurrences.len(), endpoint.clone())
                    .with_relation(Some(relation.record.clone()));
                occurrences.push(occurrence);
            }
        }
        Ok(occurrences)
    }

    /// One occurrence per (merged, rewritten, loaded) value of `field`
    fn field_occurrences(
        &mut self,
        walk: &Walk,
        tag: &str,
        node: &SchemaNode,
        field: &str,
    ) -> Result<Vec<ValueOccurrence>> {
        let mut values = self.read_values(walk, field)?;
        if let Some(merge) = &node.merge_fn {
            if !values.is_empty() {
                values = vec![self.registry.merge(merge, &values)?];
            }
        }
        for modifier in &mut self.modifiers {
            values = modifier.rewrite_value_sequence(node, tag, values);
        }

        let current = walk.current();
        let mut occurrences = Vec::new();
        for (delta, value) in values.into_iter().enumerate() {
            let (entity, relation) = match &node.child_entity_loader {
                Some(loader) => match self.registry.load(loader, current, Some(&value)) {
                    Ok(Some(entity)) => (entity, None),
                    Ok(None) => continue,
                    Err(err @ Error::SchemaConfig(_)) => return Err(err),
                    Err(err) => {
                        self.warn(format!("Could not load entity at {}: {}", walk.path(), err));
                        continue;
                    }
                },
                None => (current.entity.clone(), current.relation.clone()),
            };
            let to_insert = node.static_value.clone().unwrap_or_else(|| value.clone());
            occurrences.push(
                ValueOccurrence::new(delta, entity)
                    .with_value(value, to_insert)
                    .with_relation(relation)
                    .with_field(field),
            );
        }
        Ok(occurrences)
    }

    /// Values of `field` for the current frame
    ///
    /// The frame's relation shadows the entity for the fields it exposes.
    fn read_values(&mut self, walk: &Walk, field: &str) -> Result<Vec<Value>> {
        let current = walk.current();
        if let Some(relation) = &current.relation {
            if relation.exposes(field) {
                return Ok(read_field(relation.as_ref(), field).unwrap_or_default());
            }
        }
        match read_field(current.entity.as_ref(), field) {
            Some(values) => Ok(values),
            None => {
                self.recover(Error::FieldNotFound {
                    field: field.to_string(),
                    path: walk.path(),
                })?;
                Ok(Vec::new())
            }
        }
    }

    fn constraint_error(&self, walk: &Walk, node: &SchemaNode, count: usize) -> ConstraintError {
        let (kind, mut subject) = match &node.child_relation {
            Some(kind) => ("relation", kind.clone()),
            None => ("field", node.field_ref.clone().unwrap_or_default()),
        };

        if let Some(label) = &node.error_label {
            subject = label.clone();
            if let Some(label_field) = &node.error_label_field {
                let first = read_field(walk.current().entity.as_ref(), label_field)
                    .and_then(|values| values.into_iter().next())
                    .and_then(|v| value::to_text(&value::flatten(v)));
                if let Some(text) = first {
                    subject = subject.replace('%', &text);
                }
            }
        }

        let detail = if count == 0 {
            "is required".to_string()
        } else if count < node.min_occurs as usize {
            format!(
                "must be present at least {} times, but is only here {} times",
                node.min_occurs, count
            )
        } else {
            format!(
                "can be present at most {} times, but is here {} times",
                node.max_occurs, count
            )
        };

        ConstraintError::new(format!("the {} {} {}", kind, subject, detail), count, node.min_occurs, node.max_occurs)
            .with_document(&self.name)
            .with_path(walk.path())
    }

    /// Field mode: one element per occurrence
    fn insert_field(
        &mut self,
        walk: &mut Walk,
        tag: &str,
        node: &Arc<SchemaNode>,
        occurrences: Vec<ValueOccurrence>,
        parent: &mut Element,
    ) -> Result<bool> {
        let inserted = !occurrences.is_empty();
        for occurrence in &occurrences {
            let frame = walk.current().occurrence(occurrence);
            walk.stack.push(frame);
            let result = self.insert_occurrence(walk, tag, node, occurrence.value_to_insert.clone(), parent);
            walk.stack.pop();
            result?;
        }
        Ok(inserted)
    }

    /// Value and blank modes
    ///
    /// Repeats once per resolved occurrence, or `max(1, min_occurs)` times.
    /// With a value every repetition counts as content; blank repetitions
    /// only count when their subtree inserted something, and are dropped
    /// when it did not and the node is optional.
    fn insert_repeated(
        &mut self,
        walk: &mut Walk,
        tag: &str,
        node: &Arc<SchemaNode>,
        occurrences: Option<Vec<ValueOccurrence>>,
        static_value: Option<Value>,
        parent: &mut Element,
    ) -> Result<bool> {
        let occurrences = match occurrences {
            Some(resolved) => resolved,
            None => {
                let current = walk.current();
                let relation = if node.child_entity_loader.is_some() {
                    None
                } else {
                    current.relation.clone()
                };
                (0..node.min_occurs.max(1) as usize)
                    .map(|delta| ValueOccurrence::new(delta, current.entity.clone()).with_relation(relation.clone()))
                    .collect()
            }
        };

        let mut inserted = false;
        for mut occurrence in occurrences {
            if let Some(v) = &static_value {
                if occurrence.value_to_insert.is_none() {
                    occurrence = occurrence.with_value(v.clone(), v.clone());
                }
            }
            let frame = walk.current().occurrence(&occurrence);
            walk.stack.push(frame);
            let result = self.build_element(walk, tag, node, static_value.clone());
            walk.stack.pop();

            let (element, children_inserted) = result?;
            if static_value.is_some() {
                parent.add_child(element);
                inserted = true;
            } else if children_inserted {
                parent.add_child(element);
                inserted = true;
            } else if node.min_occurs > 0 {
                parent.add_child(element);
            }
        }
        Ok(inserted)
    }

    fn insert_occurrence(
        &mut self,
        walk: &mut Walk,
        tag: &str,
        node: &Arc<SchemaNode>,
        value: Option<Value>,
        parent: &mut Element,
    ) -> Result<()> {
        let (element, _) = self.build_element(walk, tag, node, value)?;
        parent.add_child(element);
        Ok(())
    }

    /// Create the element for the current frame and process its children
    fn build_element(
        &mut self,
        walk: &mut Walk,
        tag: &str,
        node: &Arc<SchemaNode>,
        value: Option<Value>,
    ) -> Result<(Element, bool)> {
        let mut element = self.insert_element(walk, tag, node, value)?;
        let entity = walk.current().entity_for_children();
        let children_inserted = self.build_children(walk, node, entity, &mut element)?;
        Ok((element, children_inserted))
    }

    /// Create one element with its attributes and content
    fn insert_element(&mut self, walk: &Walk, tag: &str, node: &SchemaNode, value: Option<Value>) -> Result<Element> {
        let current = walk.current();
        let value = match &node.process {
            Some(process) => Some(self.registry.transform(process, current)?),
            None => value,
        };
        let value = value.map(value::flatten);

        let mut element = Element::new(tag);
        for (name, attribute) in &node.attributes {
            let computed = match attribute {
                AttributeValue::Static(v) => v.clone(),
                AttributeValue::Computed(callable) => self.registry.transform(callable, current)?,
            };
            let Some(text) = value::to_text(&value::flatten(computed)) else {
                continue;
            };
            if let Some(restrictions) = &node.restrictions {
                if !restrictions.allows_attribute(name, &text) {
                    self.warn(format!(
                        "Value \"{}\" of attribute {} at {} is not one of the allowed values",
                        text,
                        name,
                        walk.path()
                    ));
                }
            }
            element.set_attribute(name.as_str(), text);
        }

        if let (Some(restrictions), Some(text)) = (&node.restrictions, value.as_ref().and_then(value::to_text)) {
            if !restrictions.allows(&text) {
                self.warn(format!(
                    "Value \"{}\" at {} is not one of the allowed values",
                    text,
                    walk.path()
                ));
            }
        }

        let mut value = value;
        for modifier in &mut self.modifiers {
            value = modifier.rewrite_value(tag, node, value);
        }

        if let Some(text) = value.map(value::flatten).as_ref().and_then(value::to_text) {
            if !text.trim().is_empty() {
                if node.raw_markup {
                    let markup = entities::translate_entities(&format!("<div>{}</div>", text));
                    element.push_markup(markup)?;
                } else {
                    element.push_text(entities::encode_text(&text));
                }
            }
        }
        Ok(element)
    }
}

impl fmt::Debug for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("registry", &self.registry)
            .field("modifiers", &self.modifiers.len())
            .field("relations", &self.relations.is_some())
            .field("validator", &self.validator.as_ref().map(|(_, url)| url))
            .finish()
    }
}

/// Build one document with the built-in callables and no relations
pub fn build_xml(name: &str, schema: Arc<SchemaNode>, root: EntityRef, options: BuildOptions) -> Result<String> {
    Builder::new(name, schema, options).build(root)
}
