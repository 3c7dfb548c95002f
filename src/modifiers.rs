//! Build modifiers
//!
//! Modifiers observe a build and may rewrite what gets inserted. They are
//! stateful objects rather than free callables so that they can keep track
//! of what they have seen across the whole document, e.g. to number
//! citations in order of appearance.

use crate::documents::Document;
use crate::entity::EntityRef;
use crate::schema::SchemaNode;
use crate::value::Value;

/// Observer hooked into the document builder
pub trait Modifier {
    /// Called once before the first node is processed
    fn on_build_start(&mut self, _schema: &SchemaNode, _entity: &EntityRef, _document: &mut Document) {}

    /// Rewrite a single value about to be inserted under `tag`
    ///
    /// Returning `None` inserts no content.
    fn rewrite_value(&mut self, _tag: &str, _node: &SchemaNode, value: Option<Value>) -> Option<Value> {
        value
    }

    /// Rewrite the values read from a field before they become occurrences
    ///
    /// May filter or reorder. Each remaining value still goes through
    /// [`rewrite_value`](Self::rewrite_value).
    fn rewrite_value_sequence(&mut self, _node: &SchemaNode, _tag: &str, values: Vec<Value>) -> Vec<Value> {
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryEntity;
    use serde_json::json;

    struct Numbering {
        seen: Vec<String>,
    }

    impl Modifier for Numbering {
        fn rewrite_value(&mut self, tag: &str, _node: &SchemaNode, value: Option<Value>) -> Option<Value> {
            if tag != "ref" {
                return value;
            }
            let key = value.as_ref().map(crate::value::describe)?;
            let position = match self.seen.iter().position(|s| *s == key) {
                Some(p) => p,
                None => {
                    self.seen.push(key);
                    self.seen.len() - 1
                }
            };
            Some(json!(format!("Table {}", position + 1)))
        }
    }

    #[test]
    fn test_default_hooks_pass_values_through() {
        struct Noop;
        impl Modifier for Noop {}

        let mut noop = Noop;
        let node = SchemaNode::new();
        let entity = MemoryEntity::new("node", "1").into_ref();
        let mut document = Document::new();
        noop.on_build_start(&node, &entity, &mut document);
        assert_eq!(noop.rewrite_value("a", &node, Some(json!("x"))), Some(json!("x")));
        assert_eq!(noop.rewrite_value_sequence(&node, "a", vec![json!(1), json!(2)]), vec![json!(1), json!(2)]);
    }

    #[test]
    fn test_stateful_modifier() {
        let mut numbering = Numbering { seen: Vec::new() };
        let node = SchemaNode::new();
        assert_eq!(numbering.rewrite_value("ref", &node, Some(json!("t-9"))), Some(json!("Table 1")));
        assert_eq!(numbering.rewrite_value("ref", &node, Some(json!("t-3"))), Some(json!("Table 2")));
        assert_eq!(numbering.rewrite_value("ref", &node, Some(json!("t-9"))), Some(json!("Table 1")));
        assert_eq!(numbering.rewrite_value("other", &node, Some(json!("t-9"))), Some(json!("t-9")));
    }
}
