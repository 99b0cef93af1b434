//! Schema-based multi-tenancy for PostgreSQL.
//!
//! Each tenant's tables live in their own schema inside one database; the
//! connection's `search_path` is switched per operation.
//!
//! - **error**: Error handling with PostgreSQL-specific details
//! - **models**: Schema names, search paths, configuration, client commands
//! - **services**: Resolution, the schema registry, duplication, migrations
//! - **state**: The shared configuration snapshot
//! - **logging**: Structured logging setup

pub mod error;
pub mod logging;
pub mod models;
pub mod services;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;
#[cfg(test)]
mod verification_tests;

pub use error::StrataError;
pub use models::{
    DatabaseConfig, DumpOptions, LoadOptions, SchemaName, SchemaOverrides, SearchPath,
    ShellCommand, TenancyConfig,
};
pub use services::{
    ConnectionPool, CreateOptions, DuplicateOptions, ExtensionInstaller, ListOptions,
    MigrationRunner, Migrator, ModelLayer, PooledConnection, SchemaConnection, SchemaRegistry,
    SearchPathResolver, StructureDumper, Suffixifier,
};
pub use state::ConfigHandle;
