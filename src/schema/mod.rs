//! Schema model and algebra
//!
//! - [`node`]: the typed schema tree
//! - [`tree`]: conversion to and from the property-bag JSON form
//! - [`merge`] and [`compare`]: structural merge and diff
//! - [`providers`]: assembling a schema from several fragments

pub mod compare;
pub mod merge;
pub mod node;
pub mod providers;
pub mod tree;

pub use compare::{compare_trees, diff_schema, SchemaDiff};
pub use merge::{merge_schema, merge_schema_annotated, merge_trees};
pub use node::{AttributeValue, Callable, Condition, Restrictions, SchemaNode, UNBOUNDED};
pub use providers::{SchemaProvider, SchemaRegistry, StaticProvider};
