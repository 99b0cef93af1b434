//! Data models for strata.
//!
//! This module contains all core data structures:
//! - `config` - TenancyConfig, DatabaseConfig
//! - `schema_name` - validated SchemaName
//! - `search_path` - SearchPath
//! - `command` - DumpOptions, LoadOptions, ShellCommand
//! - `overrides` - SchemaOverrides for entities pinned to `public`

pub mod command;
pub mod config;
pub mod overrides;
pub mod schema_name;
pub mod search_path;

pub use command::{DumpOptions, LoadOptions, ShellCommand};
pub use config::{DatabaseConfig, TenancyConfig};
pub use overrides::SchemaOverrides;
pub use schema_name::SchemaName;
pub use search_path::SearchPath;
