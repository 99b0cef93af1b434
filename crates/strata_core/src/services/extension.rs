//! PostgreSQL extensions living in their own persistent schema.
//!
//! An extension such as `hstore` is installed into a schema of the same name,
//! which every tenant search path includes because it is listed in the
//! persistent schemas.

use crate::error::StrataError;
use crate::models::schema_name::quote_ident;
use crate::models::SchemaName;
use crate::services::connection::SchemaConnection;
use crate::services::registry::{CreateOptions, SchemaRegistry};
use crate::services::suffix::Suffixifier;

/// Installs extensions into persistent schemas.
pub struct ExtensionInstaller<'r, C: SchemaConnection> {
    registry: &'r SchemaRegistry<C>,
}

impl<'r, C: SchemaConnection> ExtensionInstaller<'r, C> {
    /// Create an installer.
    pub fn new(registry: &'r SchemaRegistry<C>) -> Self {
        Self { registry }
    }

    /// Install `extension` into its schema, creating the schema if needed.
    /// Returns the suffixed schema name.
    pub async fn install(&self, extension: &str) -> Result<String, StrataError> {
        let config = self.registry.config().current();
        let name = SchemaName::validate_format(extension)?;

        if !config.persistent_schemas.iter().any(|s| s == name.as_str()) {
            return Err(StrataError::config(format!(
                "{name} must be listed in persistent_schemas to be installed"
            )));
        }

        let schema = Suffixifier::from_config(&config).suffixify(name.as_str());
        if !self.registry.exists(name.as_str()).await? {
            let options = CreateOptions { force: true, load_structure: false };
            self.registry.create(name.as_str(), options).await?;
        }

        let sql = format!(
            "CREATE EXTENSION IF NOT EXISTS {} SCHEMA {}",
            quote_ident(name.as_str()),
            quote_ident(&schema)
        );
        self.registry.connection().batch_execute(&sql).await?;

        tracing::info!(extension = %name, schema = %schema, "Extension installed");
        Ok(schema)
    }
}
