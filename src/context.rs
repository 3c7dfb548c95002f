//! Build context frames
//!
//! Every schema node being processed gets a frame describing the entity,
//! relation and value in play. Callables receive the current frame. A child
//! frame starts from the parent's child entity and child relation; anything
//! else is reset.

use std::fmt;
use std::sync::Arc;

use crate::entity::EntityRef;
use crate::schema::SchemaNode;
use crate::value::Value;

/// One frame of the build context
#[derive(Clone)]
pub struct BuildContext {
    /// Tag of the element being built (empty for the root frame)
    pub tag: String,
    /// Entity being processed
    pub entity: EntityRef,
    /// Relation record whose fields shadow the entity's
    pub relation: Option<EntityRef>,
    /// Entity handed to the children of the current occurrence
    pub child_entity: Option<EntityRef>,
    /// Relation handed to the children of the current occurrence
    pub child_relation: Option<EntityRef>,
    /// Field driving the current occurrence
    pub field: Option<String>,
    /// Index of the current occurrence
    pub delta: Option<usize>,
    /// Value read from the field
    pub raw_value: Option<Value>,
    /// Value about to be inserted
    pub value_to_insert: Option<Value>,
    /// Schema node being processed
    pub schema: Option<Arc<SchemaNode>>,
}

impl BuildContext {
    /// Frame for the start of a build
    pub fn root(entity: EntityRef, schema: Arc<SchemaNode>) -> Self {
        Self {
            tag: String::new(),
            entity,
            relation: None,
            child_entity: None,
            child_relation: None,
            field: None,
            delta: None,
            raw_value: None,
            value_to_insert: None,
            schema: Some(schema),
        }
    }

    /// Frame for a child node processed with `entity`
    ///
    /// The relation of the new frame is this frame's child relation.
    pub fn enter(&self, tag: &str, entity: EntityRef, schema: Arc<SchemaNode>) -> Self {
        Self {
            tag: tag.to_string(),
            entity,
            relation: self.child_relation.clone(),
            child_entity: None,
            child_relation: None,
            field: None,
            delta: None,
            raw_value: None,
            value_to_insert: None,
            schema: Some(schema),
        }
    }

    /// Replace the entity after a load; the relation does not survive
    pub fn with_entity(mut self, entity: EntityRef) -> Self {
        self.entity = entity;
        self.relation = None;
        self
    }

    /// Frame for one occurrence of the node this frame processes
    pub fn occurrence(&self, occurrence: &ValueOccurrence) -> Self {
        Self {
            tag: self.tag.clone(),
            entity: self.entity.clone(),
            relation: self.relation.clone(),
            child_entity: Some(occurrence.entity.clone()),
            child_relation: occurrence.relation.clone(),
            field: occurrence.field.clone().or_else(|| self.field.clone()),
            delta: Some(occurrence.delta),
            raw_value: occurrence.raw_value.clone(),
            value_to_insert: occurrence.value_to_insert.clone(),
            schema: self.schema.clone(),
        }
    }

    /// Entity the children of this frame are processed with
    pub fn entity_for_children(&self) -> EntityRef {
        self.child_entity.clone().unwrap_or_else(|| self.entity.clone())
    }
}

impl fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildContext")
            .field("tag", &self.tag)
            .field("entity", &format_args!("{}:{}", self.entity.entity_type(), self.entity.identifier()))
            .field("relation", &self.relation.as_ref().map(|r| r.identifier()))
            .field("field", &self.field)
            .field("delta", &self.delta)
            .field("value_to_insert", &self.value_to_insert)
            .finish()
    }
}

/// One resolved occurrence of a node
#[derive(Debug, Clone)]
pub struct ValueOccurrence {
    /// Index of the occurrence
    pub delta: usize,
    /// Value read from the field
    pub raw_value: Option<Value>,
    /// Value to insert for the occurrence
    pub value_to_insert: Option<Value>,
    /// Entity for the occurrence's children
    pub entity: EntityRef,
    /// Relation for the occurrence's children
    pub relation: Option<EntityRef>,
    /// Field the occurrence was read from
    pub field: Option<String>,
}

impl ValueOccurrence {
    /// Occurrence carrying an entity and no value
    pub fn new(delta: usize, entity: EntityRef) -> Self {
        Self {
            delta,
            raw_value: None,
            value_to_insert: None,
            entity,
            relation: None,
            field: None,
        }
    }

    /// Set the value read and the value to insert
    pub fn with_value(mut self, raw_value: Value, value_to_insert: Value) -> Self {
        self.raw_value = Some(raw_value);
        self.value_to_insert = Some(value_to_insert);
        self
    }

    /// Set the relation handed to the children
    pub fn with_relation(mut self, relation: Option<EntityRef>) -> Self {
        self.relation = relation;
        self
    }

    /// Set the field
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

/// LIFO stack of frames over a root frame that is never popped
#[derive(Debug)]
pub struct ContextStack {
    root: BuildContext,
    frames: Vec<BuildContext>,
}

impl ContextStack {
    /// Create a stack holding only the root frame
    pub fn new(root: BuildContext) -> Self {
        Self {
            root,
            frames: Vec::new(),
        }
    }

    /// Push a frame
    pub fn push(&mut self, frame: BuildContext) {
        self.frames.push(frame);
    }

    /// Pop the top frame; the root frame stays
    pub fn pop(&mut self) -> Option<BuildContext> {
        self.frames.pop()
    }

    /// The active frame
    pub fn current(&self) -> &BuildContext {
        self.frames.last().unwrap_or(&self.root)
    }

    /// Modify the active frame in place
    pub fn modify(&mut self, f: impl FnOnce(&mut BuildContext)) {
        match self.frames.last_mut() {
            Some(frame) => f(frame),
            None => f(&mut self.root),
        }
    }

    /// Number of frames above the root
    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryEntity;
    use serde_json::json;

    fn schema() -> Arc<SchemaNode> {
        Arc::new(SchemaNode::new())
    }

    #[test]
    fn test_child_frame_inherits_child_relation() {
        let a = MemoryEntity::new("node", "a").into_ref();
        let b = MemoryEntity::new("node", "b").into_ref();
        let rel = MemoryEntity::new("relation", "r").into_ref();

        let root = BuildContext::root(a.clone(), schema());
        let parent = root.enter("kin", a.clone(), schema());
        let occurrence = ValueOccurrence::new(0, b.clone()).with_relation(Some(rel.clone()));
        let frame = parent.occurrence(&occurrence);
        assert_eq!(frame.entity_for_children().identifier(), "b");

        let child = frame.enter("name", frame.entity_for_children(), schema());
        assert_eq!(child.entity.identifier(), "b");
        assert_eq!(child.relation.as_ref().map(|r| r.identifier()), Some("r".to_string()));
        assert!(child.field.is_none());

        let loaded = child.with_entity(a);
        assert!(loaded.relation.is_none());
    }

    #[test]
    fn test_occurrence_frame_values() {
        let a = MemoryEntity::new("node", "a").into_ref();
        let frame = BuildContext::root(a.clone(), schema()).enter("tag", a.clone(), schema());
        let occurrence = ValueOccurrence::new(2, a)
            .with_value(json!({"value": "x"}), json!("y"))
            .with_field("f");
        let frame = frame.occurrence(&occurrence);
        assert_eq!(frame.delta, Some(2));
        assert_eq!(frame.field.as_deref(), Some("f"));
        assert_eq!(frame.value_to_insert, Some(json!("y")));
    }

    #[test]
    fn test_stack_keeps_root() {
        let a = MemoryEntity::new("node", "a").into_ref();
        let mut stack = ContextStack::new(BuildContext::root(a.clone(), schema()));
        assert_eq!(stack.depth(), 0);
        assert!(stack.pop().is_none());
        assert_eq!(stack.current().tag, "");

        stack.push(stack.current().enter("x", a, schema()));
        stack.modify(|f| f.delta = Some(4));
        assert_eq!(stack.current().tag, "x");
        assert_eq!(stack.current().delta, Some(4));
        assert_eq!(stack.depth(), 1);
        stack.pop();
        assert_eq!(stack.current().tag, "");
    }
}
