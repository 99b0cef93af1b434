//! Tenant schema services.
//!
//! - `suffix` - Environment suffixes on schema names
//! - `search_path` - Default and per-tenant search path resolution
//! - `connection` - The connection seam and its deadpool-postgres implementation
//! - `registry` - Schema lifecycle and switching
//! - `command` - Dump and load client command lines
//! - `duplicator` - Schema cloning through the dump and load clients
//! - `migrator` - Migrations across tenant schemas
//! - `dumper` - Structure files
//! - `extension` - Extensions in persistent schemas

pub mod command;
pub mod connection;
pub mod dumper;
pub mod duplicator;
pub mod extension;
pub mod migrator;
pub mod registry;
pub mod search_path;
pub mod suffix;

pub use command::{dump_command, load_command};
pub use connection::{ConnectionPool, PooledConnection, SchemaConnection};
pub use dumper::StructureDumper;
pub use duplicator::{DuplicateOptions, Duplicator, SchemaRewriter};
pub use extension::ExtensionInstaller;
pub use migrator::{MigrationRunner, Migrator, ModelLayer};
pub use registry::{CreateOptions, ListOptions, SchemaRegistry};
pub use search_path::SearchPathResolver;
pub use suffix::Suffixifier;
