//! Schema merging
//!
//! Merging works on the property-bag form so that directives, attribute
//! maps and children are all combined by the same rule: objects merge key
//! by key, anything else is replaced by the right-hand side.

use indexmap::IndexMap;
use serde_json::Map;

use super::node::{split_numbered, SchemaNode};
use super::tree::{is_directive, keys};
use crate::error::Result;
use crate::value::Value;

/// Merge two property-bag trees
///
/// Keys of `a` come first, in `a`'s order, followed by the keys only `b`
/// has. A `tag#N` key of `b` is merged against `a`'s `tag` entry unless `a`
/// has a `tag#N` of its own. Arrays are treated as plain values.
///
/// With `diff` set, the result carries `#comment` notes listing child tags
/// present on one side only and container/value mismatches.
pub fn merge_trees(a: &Value, b: &Value, diff: bool) -> Value {
    let (a_map, b_map) = match (a, b) {
        (Value::Object(a_map), Value::Object(b_map)) => (a_map, b_map),
        (Value::Object(_), _) if diff => {
            let mut kept = a.clone();
            annotate(&mut kept, "DIFF: Type mismatch, this value was not an array in the provided schema;");
            return kept;
        }
        (_, Value::Object(_)) if diff => {
            let mut kept = b.clone();
            annotate(&mut kept, "DIFF: Type mismatch, this value was not an array in the source schema;");
            return kept;
        }
        _ => return b.clone(),
    };

    let mut leftover: IndexMap<String, Value> = b_map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    let mut result = Map::new();
    let mut notes = String::new();

    for (a_key, a_value) in a_map {
        match leftover.shift_remove(a_key) {
            Some(b_value) => {
                result.insert(a_key.clone(), merge_trees(a_value, &b_value, diff));
            }
            None => {
                result.insert(a_key.clone(), a_value.clone());
                if diff && !is_directive(a_key) {
                    notes.push_str(&format!(" DIFF: {} missing in provided schema;", a_key));
                }
            }
        }

        if is_directive(a_key) {
            continue;
        }
        let numbered: Vec<String> = leftover
            .keys()
            .filter(|b_key| {
                let (base, number) = split_numbered(b_key);
                number.is_some() && base == a_key && !a_map.contains_key(b_key.as_str())
            })
            .cloned()
            .collect();
        for b_key in numbered {
            if let Some(b_value) = leftover.shift_remove(&b_key) {
                result.insert(b_key, merge_trees(a_value, &b_value, diff));
            }
        }
    }

    for (b_key, b_value) in leftover {
        if diff && !is_directive(&b_key) {
            notes.push_str(&format!(" DIFF: {} missing in source schema;", b_key));
        }
        if b_key == keys::COMMENT {
            if let Some(text) = b_value.as_str() {
                append_comment(&mut result, text);
                continue;
            }
        }
        result.insert(b_key, b_value);
    }

    if !notes.is_empty() {
        append_comment(&mut result, &notes);
    }
    Value::Object(result)
}

fn annotate(value: &mut Value, note: &str) {
    if let Value::Object(map) = value {
        append_comment(map, &format!(" {}", note));
    }
}

fn append_comment(map: &mut Map<String, Value>, text: &str) {
    let entry = map
        .entry(keys::COMMENT)
        .or_insert_with(|| Value::String(String::new()));
    match entry {
        Value::String(existing) => existing.push_str(text),
        other => *other = Value::String(text.to_string()),
    }
}

/// Merge `b` into `a`
///
/// Children and directives of `b` extend or replace those of `a`; the
/// result is validated before it is returned.
pub fn merge_schema(a: &SchemaNode, b: &SchemaNode) -> Result<SchemaNode> {
    SchemaNode::from_tree(&merge_trees(&a.to_tree(), &b.to_tree(), false))
}

/// Merge `b` into `a`, leaving `#comment` notes where the two disagree
pub fn merge_schema_annotated(a: &SchemaNode, b: &SchemaNode) -> Result<SchemaNode> {
    SchemaNode::from_tree(&merge_trees(&a.to_tree(), &b.to_tree(), true))
}
