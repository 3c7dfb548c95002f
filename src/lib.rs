//! # schemaxml
//!
//! Schema-driven XML document generation from entity records.
//!
//! A schema is a tree of element names annotated with directives
//! (`#field`, `#value`, `#min_occurence`, `#child_relation`, ...). The
//! builder walks the tree against an entity and emits one element per
//! resolved occurrence, checking occurrence bounds as it goes.
//!
//! ## Features
//!
//! - Document generation with occurrence constraints and backtracking of
//!   optional empty elements
//! - Entity and relation traversal through host-supplied accessors
//! - Named callables for value processing, entity loading and merging
//! - Stateful modifiers observing the build
//! - XSD import into the schema format
//! - Structural schema merge and diff
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use schemaxml::{build_xml, BuildOptions, MemoryEntity, SchemaNode};
//!
//! let schema = SchemaNode::from_json(r##"{"article": {"title": {"#field": "title"}}}"##)?;
//! let entity = MemoryEntity::new("node", "1").with_field("title", "Rex".into());
//! let xml = build_xml("article", Arc::new(schema), entity.into_ref(), BuildOptions::default())?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Foundation
pub mod error;
pub mod limits;
pub mod value;

// Schema model
pub mod schema;

// Entity access
pub mod entity;
pub mod memory;

// Document generation
pub mod builder;
pub mod context;
pub mod documents;
pub mod entities;
pub mod modifiers;
pub mod registry;
pub mod validation;

// XSD import
pub mod importer;
pub mod loaders;

// Re-exports for convenience
pub use builder::{build_xml, BuildOptions, Builder};
pub use context::{BuildContext, ValueOccurrence};
pub use documents::{Document, Element};
pub use entity::{Entity, EntityRef, FieldValue, Relation, RelationStore};
pub use error::{ConstraintError, Error, Result};
pub use importer::{import_xsd, XsdImporter};
pub use limits::Limits;
pub use loaders::Location;
pub use memory::{Fixture, MemoryEntity, MemoryRelationStore};
pub use modifiers::Modifier;
pub use registry::Registry;
pub use schema::{
    diff_schema, merge_schema, Callable, SchemaDiff, SchemaNode, SchemaProvider, SchemaRegistry,
};
pub use validation::XsdValidator;

/// Version of the schemaxml library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
