//! Schema providers
//!
//! A logical schema name may be contributed to by several providers. The
//! registry merges every fragment in registration order, then lets each
//! provider alter the merged result.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use super::merge::merge_trees;
use super::node::SchemaNode;
use crate::error::Result;
use crate::value::Value;

/// Source of schema fragments
pub trait SchemaProvider {
    /// Provider name, used in diagnostics
    fn name(&self) -> &str;

    /// Property-bag fragment this provider contributes to `schema_name`
    fn fragment(&self, schema_name: &str, variables: &Value) -> Result<Option<Value>>;

    /// Adjust the merged schema
    fn alter(&self, _schema_name: &str, _schema: &mut SchemaNode, _variables: &Value) -> Result<()> {
        Ok(())
    }
}

/// Provider returning fixed fragments per schema name
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    name: String,
    fragments: IndexMap<String, Value>,
}

impl StaticProvider {
    /// Create a provider without fragments
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fragments: IndexMap::new(),
        }
    }

    /// Contribute a fragment to a schema name
    pub fn with_fragment(mut self, schema_name: impl Into<String>, fragment: Value) -> Self {
        self.fragments.insert(schema_name.into(), fragment);
        self
    }
}

impl SchemaProvider for StaticProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn fragment(&self, schema_name: &str, _variables: &Value) -> Result<Option<Value>> {
        Ok(self.fragments.get(schema_name).cloned())
    }
}

/// Ordered set of schema providers
#[derive(Default)]
pub struct SchemaRegistry {
    providers: Vec<Box<dyn SchemaProvider>>,
}

impl SchemaRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider
    pub fn register(&mut self, provider: Box<dyn SchemaProvider>) {
        self.providers.push(provider);
    }

    /// Builder-style variant of [`register`](Self::register)
    pub fn with_provider(mut self, provider: impl SchemaProvider + 'static) -> Self {
        self.register(Box::new(provider));
        self
    }

    /// Number of registered providers
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether no provider is registered
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Assemble the schema registered under `schema_name`
    pub fn resolve(&self, schema_name: &str, variables: &Value) -> Result<Arc<SchemaNode>> {
        let mut tree = Value::Object(Default::default());
        let mut contributors = 0;
        for provider in &self.providers {
            if let Some(fragment) = provider.fragment(schema_name, variables)? {
                tracing::debug!(provider = provider.name(), schema = schema_name, "merging schema fragment");
                tree = merge_trees(&tree, &fragment, false);
                contributors += 1;
            }
        }
        if contributors == 0 {
            tracing::debug!(schema = schema_name, "no provider contributes to schema");
        }

        let mut schema = SchemaNode::from_tree(&tree)?;
        for provider in &self.providers {
            provider.alter(schema_name, &mut schema, variables)?;
        }
        schema.validate("root")?;
        Ok(Arc::new(schema))
    }
}

impl fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.providers.iter().map(|p| p.name()).collect();
        f.debug_struct("SchemaRegistry").field("providers", &names).finish()
    }
}
