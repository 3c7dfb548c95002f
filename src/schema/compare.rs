//! Schema comparison
//!
//! Two schemas are equivalent when their property-bag trees have the same
//! keys in the same places with the same values. Occurrence bounds equal to
//! the default are treated as absent.

use std::fmt;

use super::node::SchemaNode;
use super::tree::keys;
use crate::value::{self, Value};

/// Result of comparing two schemas
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SchemaDiff {
    /// Whether the schemas are equivalent
    pub equal: bool,
    /// Human readable description of each change, in tree order
    pub changes: Vec<String>,
}

impl SchemaDiff {
    /// Whether the schemas are equivalent
    pub fn is_equal(&self) -> bool {
        self.equal
    }
}

impl fmt::Display for SchemaDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.equal {
            return write!(f, "Schemas are equivalent.");
        }
        for (i, change) in self.changes.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", change)?;
        }
        Ok(())
    }
}

/// Compare two property-bag trees
pub fn compare_trees(a: &Value, b: &Value) -> SchemaDiff {
    let mut changes = Vec::new();
    let equal = compare_at(a, b, "root", &mut changes);
    SchemaDiff { equal, changes }
}

/// Compare two schemas
pub fn diff_schema(a: &SchemaNode, b: &SchemaNode) -> SchemaDiff {
    compare_trees(&a.to_tree(), &b.to_tree())
}

fn is_default_occurrence(key: &str, value: &Value) -> bool {
    (key == keys::MIN_OCCURS || key == keys::MAX_OCCURS) && value.as_i64() == Some(1)
}

fn render_key(key: &str, value: &Value) -> String {
    if value.is_object() {
        key.to_string()
    } else {
        format!("{} => \"{}\"", key, value::describe(value))
    }
}

fn compare_at(a: &Value, b: &Value, path: &str, changes: &mut Vec<String>) -> bool {
    let (a_map, b_map) = match (a, b) {
        (Value::Object(a_map), Value::Object(b_map)) => (a_map, b_map),
        (Value::Object(_), _) => {
            changes.push(format!("Schema item {} has been changed from a schema array to a value.", path));
            return false;
        }
        (_, Value::Object(_)) => {
            changes.push(format!("Schema item {} has been changed from a value to a schema array.", path));
            return false;
        }
        _ => {
            if a == b {
                return true;
            }
            changes.push(format!(
                "Value of {} has been changed from \"{}\" to \"{}\".",
                path,
                value::describe(a),
                value::describe(b)
            ));
            return false;
        }
    };

    let mut equal = true;
    for (key, a_value) in a_map {
        match b_map.get(key) {
            Some(b_value) => {
                let child_path = format!("{}>{}", path, key);
                equal = compare_at(a_value, b_value, &child_path, changes) && equal;
            }
            None if is_default_occurrence(key, a_value) => {}
            None => {
                changes.push(format!("Element {}>{} has been removed.", path, render_key(key, a_value)));
                equal = false;
            }
        }
    }

    for (key, b_value) in b_map {
        if a_map.contains_key(key) || is_default_occurrence(key, b_value) {
            continue;
        }
        changes.push(format!("Element {}>{} has been added.", path, render_key(key, b_value)));
        equal = false;
    }

    equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::merge::merge_trees;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_identical_trees() {
        let a = json!({"root": {"title": {"#field": "name"}}});
        let diff = compare_trees(&a, &a);
        assert!(diff.is_equal());
        assert!(diff.changes.is_empty());
    }

    #[test]
    fn test_value_change() {
        let a = json!({"root": {"title": {"#field": "name"}}});
        let b = json!({"root": {"title": {"#field": "label"}}});
        let diff = compare_trees(&a, &b);
        assert!(!diff.equal);
        assert_eq!(
            diff.changes,
            vec!["Value of root>root>title>#field has been changed from \"name\" to \"label\".".to_string()]
        );
    }

    #[test]
    fn test_added_and_removed() {
        let a = json!({"title": {}, "body": {"#field": "text"}, "#value": "x"});
        let b = json!({"title": {}, "date": {}});
        let diff = compare_trees(&a, &b);
        assert!(!diff.equal);
        assert_eq!(
            diff.changes,
            vec![
                "Element root>body has been removed.".to_string(),
                "Element root>#value => \"x\" has been removed.".to_string(),
                "Element root>date has been added.".to_string(),
            ]
        );
    }

    #[test]
    fn test_kind_change() {
        let diff = compare_trees(&json!({"a": {}}), &json!({"a": "b"}));
        assert_eq!(diff.changes, vec!["Schema item root>a has been changed from a schema array to a value.".to_string()]);
        let diff = compare_trees(&json!({"a": "b"}), &json!({"a": {}}));
        assert_eq!(diff.changes, vec!["Schema item root>a has been changed from a value to a schema array.".to_string()]);
    }

    #[test]
    fn test_default_occurrences_are_ignored() {
        let a = json!({"title": {"#field": "name", "#min_occurence": 1}});
        let b = json!({"title": {"#field": "name", "#max_occurence": 1}});
        assert!(compare_trees(&a, &b).is_equal());

        let c = json!({"title": {"#field": "name", "#max_occurence": 2}});
        assert!(!compare_trees(&a, &c).is_equal());
    }

    #[test]
    fn test_compare_after_merge() {
        let a = json!({"root": {"title": {"#field": "name"}}});
        let adds_defaults = json!({"root": {"title": {"#min_occurence": 1}}});
        assert!(compare_trees(&a, &merge_trees(&a, &adds_defaults, false)).is_equal());

        let adds_keys = json!({"root": {"body": {"#field": "text"}}});
        assert!(!compare_trees(&a, &merge_trees(&a, &adds_keys, false)).is_equal());
    }
}
