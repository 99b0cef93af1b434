//! Structure files for the default search path.

use std::path::Path;

use crate::error::StrataError;
use crate::models::{DumpOptions, LoadOptions};
use crate::services::command::{dump_command, load_command, run, ON_ERROR_STOP};
use crate::services::connection::SchemaConnection;
use crate::services::registry::SchemaRegistry;

/// Writes and reads the database structure as a SQL file.
pub struct StructureDumper<'r, C: SchemaConnection> {
    registry: &'r SchemaRegistry<C>,
}

impl<'r, C: SchemaConnection> StructureDumper<'r, C> {
    /// Create a dumper for a registry's database.
    pub fn new(registry: &'r SchemaRegistry<C>) -> Self {
        Self { registry }
    }

    /// Dump the structure of every schema on the default search path,
    /// persistent schemas included, to `file`.
    pub async fn dump(&self, file: &Path) -> Result<(), StrataError> {
        let default_path =
            self.registry.resolver().default_search_path(self.registry.connection()).await?;
        let schemas = self.registry.schema_search_path_for(&default_path);

        let options = DumpOptions::new(self.registry.database().clone())
            .with_schemas(schemas.as_str())
            .with_structure_only(true)
            .with_file(file);
        let command = dump_command(&options, &self.registry.config().current())?;
        run(&command).await?;

        tracing::info!(file = %file.display(), schemas = %schemas, "Structure dumped");
        Ok(())
    }

    /// Load a structure file into the database.
    pub async fn load(&self, file: &Path) -> Result<(), StrataError> {
        let options = LoadOptions::new(self.registry.database().clone()).with_file(file);
        let command =
            load_command(&options, &self.registry.config().current())?.raw_arg(ON_ERROR_STOP);
        run(&command).await?;
        self.registry.reset_column_information();

        tracing::info!(file = %file.display(), "Structure loaded");
        Ok(())
    }
}
