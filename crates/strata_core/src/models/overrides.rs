//! Fixed schema bindings for shared entities.

use std::collections::HashMap;

use crate::models::config::TenancyConfig;
use crate::models::schema_name::quote_ident;

/// Schema every excluded model is bound to.
pub const SHARED_SCHEMA: &str = "public";

/// Maps entity names to a schema that wins over the active search path.
///
/// The storage layer asks for a table's location through
/// [`SchemaOverrides::qualified_table`]; entities without an override resolve
/// unqualified, i.e. through whatever tenant search path is active.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaOverrides {
    by_entity: HashMap<String, String>,
}

impl SchemaOverrides {
    /// Create an empty set of overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind every configured excluded model to `public`.
    pub fn from_config(config: &TenancyConfig) -> Self {
        let mut overrides = Self::new();
        for entity in &config.excluded_models {
            overrides.bind(entity.as_str(), SHARED_SCHEMA);
        }
        tracing::debug!(count = overrides.len(), "Excluded models bound to shared schema");
        overrides
    }

    /// Bind an entity to a fixed schema, replacing any earlier binding.
    pub fn bind(&mut self, entity: impl Into<String>, schema: impl Into<String>) {
        self.by_entity.insert(entity.into(), schema.into());
    }

    /// The fixed schema for an entity, if any.
    pub fn schema_for(&self, entity: &str) -> Option<&str> {
        self.by_entity.get(entity).map(String::as_str)
    }

    /// Check whether an entity is pinned to a schema.
    pub fn is_excluded(&self, entity: &str) -> bool {
        self.by_entity.contains_key(entity)
    }

    /// Resolve the table reference an entity should use.
    ///
    /// Any schema qualification already on `table` is dropped first, so a
    /// pinned entity always lands in its bound schema.
    pub fn qualified_table(&self, entity: &str, table: &str) -> String {
        let bare = table.split_once('.').map_or(table, |(_, name)| name);
        match self.schema_for(entity) {
            Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(bare)),
            None => quote_ident(bare),
        }
    }

    /// Number of bound entities.
    pub fn len(&self) -> usize {
        self.by_entity.len()
    }

    /// Check if no entity is bound.
    pub fn is_empty(&self) -> bool {
        self.by_entity.is_empty()
    }
}
