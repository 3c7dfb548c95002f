//! Schema node representation
//!
//! A [`SchemaNode`] describes one XML element: how many times it occurs,
//! where its content comes from, and its children. Children are kept as an
//! ordered list of `(tag, node)` pairs so that several siblings may share a
//! tag.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::value::Value;

/// `max_occurs` value meaning "no upper bound"
pub const UNBOUNDED: i32 = -1;

lazy_static::lazy_static! {
    static ref NUMBERED_TAG: regex::Regex = regex::Regex::new(r"^(.+)#(\d+)$").unwrap();
}

/// Split a `tag#N` sibling key into its base tag and discriminator
pub fn split_numbered(key: &str) -> (&str, Option<u32>) {
    match NUMBERED_TAG.captures(key) {
        Some(caps) => {
            let base = caps.get(1).map_or(key, |m| m.as_str());
            let number = caps.get(2).and_then(|m| m.as_str().parse().ok());
            (base, number)
        }
        None => (key, None),
    }
}

/// Reference to a host-supplied function, plus fixed extra arguments
#[derive(Debug, Clone, PartialEq)]
pub struct Callable {
    /// Registry name of the function
    pub name: String,
    /// Extra arguments passed after the context
    pub args: Vec<Value>,
}

impl Callable {
    /// Reference a function without extra arguments
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Append a fixed argument
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }
}

impl fmt::Display for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.args.is_empty() {
            let args: Vec<String> = self.args.iter().map(|a| a.to_string()).collect();
            write!(f, "({})", args.join(", "))?;
        }
        Ok(())
    }
}

/// Value of a declared attribute
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// Literal value; `Null` suppresses the attribute
    Static(Value),
    /// Value computed from the build context
    Computed(Callable),
}

impl AttributeValue {
    /// Whether this is a literal null, which never produces an attribute
    pub fn is_suppressed(&self) -> bool {
        matches!(self, AttributeValue::Static(Value::Null))
    }
}

/// Guard deciding whether a node is processed at all
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Pass when the named field is not empty
    Field(String),
    /// Pass when the predicate returns true
    Call(Callable),
}

/// Allowed values for the element content and its attributes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Restrictions {
    /// Allowed element values (empty = unrestricted)
    pub enumeration: Vec<Value>,
    /// Allowed values per attribute
    pub attribute_enumerations: IndexMap<String, Vec<Value>>,
}

impl Restrictions {
    /// Whether nothing is restricted
    pub fn is_empty(&self) -> bool {
        self.enumeration.is_empty() && self.attribute_enumerations.values().all(|v| v.is_empty())
    }

    /// Check an element value against the enumeration
    pub fn allows(&self, text: &str) -> bool {
        self.enumeration.is_empty() || self.enumeration.iter().any(|v| matches_text(v, text))
    }

    /// Check an attribute value against its enumeration
    pub fn allows_attribute(&self, name: &str, text: &str) -> bool {
        match self.attribute_enumerations.get(name) {
            Some(allowed) if !allowed.is_empty() => allowed.iter().any(|v| matches_text(v, text)),
            _ => true,
        }
    }
}

fn matches_text(allowed: &Value, text: &str) -> bool {
    crate::value::to_text(allowed).map_or(false, |a| a == text)
}

/// Declarative description of one XML element
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaNode {
    /// Minimum number of occurrences
    pub min_occurs: u32,
    /// Maximum number of occurrences, [`UNBOUNDED`] for no limit
    pub max_occurs: i32,
    /// Attributes, in output order
    pub attributes: IndexMap<String, AttributeValue>,
    /// Literal content
    pub static_value: Option<Value>,
    /// Field driving occurrences and (unless `static_value` is set) content
    pub field_ref: Option<String>,
    /// Computes the inserted value from the context
    pub process: Option<Callable>,
    /// Replaces the ambient entity for this node and its descendants
    pub entity_loader: Option<Callable>,
    /// Replaces the entity for each field occurrence's children
    pub child_entity_loader: Option<Callable>,
    /// Relation kind driving occurrences
    pub child_relation: Option<String>,
    /// Collapses a multi-valued field into one value
    pub merge_fn: Option<Callable>,
    /// Processing guard
    pub condition: Option<Condition>,
    /// Label used instead of the field name in error messages
    pub error_label: Option<String>,
    /// Field whose first value replaces `%` in the error label
    pub error_label_field: Option<String>,
    /// Enumeration restrictions
    pub restrictions: Option<Restrictions>,
    /// Insert content as a markup fragment instead of escaped text
    pub raw_markup: bool,
    /// Annotations left by a diff-mode merge
    pub comment: Option<String>,
    // Bounds given explicitly survive serialization even at their default
    explicit_min: bool,
    explicit_max: bool,
    children: Vec<(String, Arc<SchemaNode>)>,
}

impl Default for SchemaNode {
    fn default() -> Self {
        Self {
            min_occurs: 1,
            max_occurs: 1,
            attributes: IndexMap::new(),
            static_value: None,
            field_ref: None,
            process: None,
            entity_loader: None,
            child_entity_loader: None,
            child_relation: None,
            merge_fn: None,
            condition: None,
            error_label: None,
            error_label_field: None,
            restrictions: None,
            raw_markup: false,
            comment: None,
            explicit_min: false,
            explicit_max: false,
            children: Vec::new(),
        }
    }
}

impl SchemaNode {
    /// Create a blank structural node occurring exactly once
    pub fn new() -> Self {
        Self::default()
    }

    /// Node whose occurrences and content come from a field
    pub fn field(name: impl Into<String>) -> Self {
        Self::new().with_field(name)
    }

    /// Node inserting a literal value
    pub fn value(value: impl Into<Value>) -> Self {
        Self::new().with_value(value)
    }

    /// Set the occurrence bounds
    pub fn with_occurs(mut self, min_occurs: u32, max_occurs: i32) -> Self {
        self.set_min_occurs(min_occurs);
        self.set_max_occurs(max_occurs);
        self
    }

    /// Make the node optional (`min_occurs = 0`)
    pub fn optional(mut self) -> Self {
        self.set_min_occurs(0);
        self
    }

    /// Remove the upper occurrence bound
    pub fn unbounded(mut self) -> Self {
        self.set_max_occurs(UNBOUNDED);
        self
    }

    /// Set the lower bound, marking it as explicitly given
    pub fn set_min_occurs(&mut self, min_occurs: u32) {
        self.min_occurs = min_occurs;
        self.explicit_min = true;
    }

    /// Set the upper bound, marking it as explicitly given
    pub fn set_max_occurs(&mut self, max_occurs: i32) {
        self.max_occurs = max_occurs;
        self.explicit_max = true;
    }

    /// Whether each bound was explicitly given, as `(min, max)`
    pub fn explicit_occurs(&self) -> (bool, bool) {
        (self.explicit_min, self.explicit_max)
    }

    /// Set the field reference
    pub fn with_field(mut self, name: impl Into<String>) -> Self {
        self.field_ref = Some(name.into());
        self
    }

    /// Set the static value
    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.static_value = Some(value.into());
        self
    }

    /// Declare a literal attribute
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), AttributeValue::Static(value.into()));
        self
    }

    /// Declare an attribute computed by a registry transform
    pub fn with_computed_attribute(mut self, name: impl Into<String>, callable: Callable) -> Self {
        self.attributes.insert(name.into(), AttributeValue::Computed(callable));
        self
    }

    /// Set the process callable
    pub fn with_process(mut self, callable: Callable) -> Self {
        self.process = Some(callable);
        self
    }

    /// Set the entity loader
    pub fn with_entity_loader(mut self, callable: Callable) -> Self {
        self.entity_loader = Some(callable);
        self
    }

    /// Set the per-occurrence entity loader
    pub fn with_child_entity_loader(mut self, callable: Callable) -> Self {
        self.child_entity_loader = Some(callable);
        self
    }

    /// Drive occurrences by a relation kind
    pub fn with_child_relation(mut self, kind: impl Into<String>) -> Self {
        self.child_relation = Some(kind.into());
        self
    }

    /// Set the merge function
    pub fn with_merge(mut self, callable: Callable) -> Self {
        self.merge_fn = Some(callable);
        self
    }

    /// Set the condition
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Set the error label and optional interpolation field
    pub fn with_error_label(mut self, label: impl Into<String>, field: Option<&str>) -> Self {
        self.error_label = Some(label.into());
        self.error_label_field = field.map(str::to_string);
        self
    }

    /// Set the restrictions
    pub fn with_restrictions(mut self, restrictions: Restrictions) -> Self {
        self.restrictions = Some(restrictions);
        self
    }

    /// Mark the content as raw markup
    pub fn raw(mut self) -> Self {
        self.raw_markup = true;
        self
    }

    /// Append a child element
    pub fn with_child(mut self, tag: impl Into<String>, child: SchemaNode) -> Self {
        self.push_child(tag, child);
        self
    }

    /// Append a child element in place
    pub fn push_child(&mut self, tag: impl Into<String>, child: SchemaNode) {
        self.children.push((tag.into(), Arc::new(child)));
    }

    /// Append an already shared child
    pub fn push_shared_child(&mut self, tag: impl Into<String>, child: Arc<SchemaNode>) {
        self.children.push((tag.into(), child));
    }

    /// Children in declaration order
    pub fn children(&self) -> impl Iterator<Item = (&str, &Arc<SchemaNode>)> {
        self.children.iter().map(|(tag, node)| (tag.as_str(), node))
    }

    /// Number of children
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Whether the node has children
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// First child with the given tag
    pub fn child(&self, tag: &str) -> Option<&SchemaNode> {
        self.children.iter().find(|(t, _)| t == tag).map(|(_, n)| n.as_ref())
    }

    /// Mutable access to the first child with the given tag
    ///
    /// The child is cloned first if it is shared with another tree.
    pub fn child_mut(&mut self, tag: &str) -> Option<&mut SchemaNode> {
        self.children
            .iter_mut()
            .find(|(t, _)| t == tag)
            .map(|(_, n)| Arc::make_mut(n))
    }

    /// Remove every child with the given tag, returning how many were removed
    pub fn remove_child(&mut self, tag: &str) -> usize {
        let before = self.children.len();
        self.children.retain(|(t, _)| t != tag);
        before - self.children.len()
    }

    /// Take the children out of the node
    pub fn into_children(self) -> Vec<(String, Arc<SchemaNode>)> {
        self.children
    }

    /// Whether `max_occurs` is unbounded
    pub fn is_unbounded(&self) -> bool {
        self.max_occurs == UNBOUNDED
    }

    /// Whether `count` occurrences satisfy the bounds
    pub fn accepts_count(&self, count: usize) -> bool {
        let above_min = count >= self.min_occurs as usize;
        let below_max = self.is_unbounded() || (self.max_occurs >= 0 && count <= self.max_occurs as usize);
        above_min && below_max
    }

    /// Check the invariants of this node and its descendants
    ///
    /// `path` is the tag path of this node, used in error messages.
    pub fn validate(&self, path: &str) -> Result<()> {
        if self.max_occurs != UNBOUNDED
            && (self.max_occurs < 0 || (self.max_occurs as i64) < self.min_occurs as i64)
        {
            return Err(Error::SchemaConfig(format!(
                "{}: max occurrence {} is lower than min occurrence {}",
                path, self.max_occurs, self.min_occurs
            )));
        }
        self.check_directives(path)?;
        for (tag, child) in &self.children {
            child.validate(&format!("{}>{}", path, tag))?;
        }
        Ok(())
    }

    /// Check that mutually exclusive directives are not combined
    pub fn check_directives(&self, path: &str) -> Result<()> {
        if self.child_relation.is_some() {
            if self.field_ref.is_some() || self.child_entity_loader.is_some() {
                return Err(Error::SchemaConfig(format!(
                    "{}: schema cannot include #child_relation and #field/#child_entity",
                    path
                )));
            }
            if matches!(self.condition, Some(Condition::Field(_))) {
                return Err(Error::SchemaConfig(format!(
                    "{}: schema cannot define both #child_relation and a #condition that relies on a field",
                    path
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_numbered() {
        assert_eq!(split_numbered("author"), ("author", None));
        assert_eq!(split_numbered("author#2"), ("author", Some(2)));
        assert_eq!(split_numbered("#attributes"), ("#attributes", None));
        assert_eq!(split_numbered("a#b"), ("a#b", None));
    }

    #[test]
    fn test_defaults() {
        let node = SchemaNode::new();
        assert_eq!(node.min_occurs, 1);
        assert_eq!(node.max_occurs, 1);
        assert!(node.accepts_count(1));
        assert!(!node.accepts_count(0));
        assert!(!node.accepts_count(2));
    }

    #[test]
    fn test_accepts_count_unbounded() {
        let node = SchemaNode::field("tags").optional().unbounded();
        assert!(node.accepts_count(0));
        assert!(node.accepts_count(1000));
    }

    #[test]
    fn test_duplicate_tags_are_kept() {
        let node = SchemaNode::new()
            .with_child("name", SchemaNode::field("given"))
            .with_child("name", SchemaNode::field("family"));
        let tags: Vec<_> = node.children().map(|(t, _)| t).collect();
        assert_eq!(tags, vec!["name", "name"]);
        assert_eq!(node.child("name").unwrap().field_ref.as_deref(), Some("given"));
    }

    #[test]
    fn test_child_mut_copies_shared_child() {
        let mut a = SchemaNode::new().with_child("title", SchemaNode::field("name"));
        let b = a.clone();
        a.child_mut("title").unwrap().field_ref = Some("label".into());
        assert_eq!(b.child("title").unwrap().field_ref.as_deref(), Some("name"));
        assert_eq!(a.child("title").unwrap().field_ref.as_deref(), Some("label"));
    }

    #[test]
    fn test_validate_occurrence_invariant() {
        let node = SchemaNode::new().with_child("x", SchemaNode::new().with_occurs(3, 2));
        let err = node.validate("root").unwrap_err();
        assert!(err.to_string().contains("root>x"));
        assert!(SchemaNode::new().with_occurs(3, UNBOUNDED).validate("root").is_ok());
    }

    #[test]
    fn test_validate_relation_exclusivity() {
        let node = SchemaNode::field("f").with_child_relation("parent");
        assert!(matches!(node.validate("root"), Err(Error::SchemaConfig(_))));

        let node = SchemaNode::new()
            .with_child_relation("parent")
            .with_condition(Condition::Field("f".into()));
        assert!(node.validate("root").is_err());

        let node = SchemaNode::new()
            .with_child_relation("parent")
            .with_condition(Condition::Call(Callable::new("always")));
        assert!(node.validate("root").is_ok());
    }

    #[test]
    fn test_restrictions() {
        let mut r = Restrictions::default();
        assert!(r.allows("anything"));
        r.enumeration = vec![json!("a"), json!(1)];
        r.attribute_enumerations.insert("lang".into(), vec![json!("en")]);
        assert!(r.allows("a"));
        assert!(r.allows("1"));
        assert!(!r.allows("b"));
        assert!(r.allows_attribute("lang", "en"));
        assert!(!r.allows_attribute("lang", "fr"));
        assert!(r.allows_attribute("other", "fr"));
    }

    #[test]
    fn test_callable_display() {
        assert_eq!(Callable::new("join").to_string(), "join");
        assert_eq!(Callable::new("property").arg("iso2").to_string(), "property(\"iso2\")");
    }
}
