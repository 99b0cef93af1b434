//! Search path resolution.
//!
//! Computes the default search path (observed once from a session, then
//! shared through the [`ConfigHandle`]) and the full path for a tenant, with
//! persistent schemas merged in.

use crate::error::StrataError;
use crate::models::search_path::split_components;
use crate::models::{SearchPath, TenancyConfig};
use crate::services::connection::SchemaConnection;
use crate::services::suffix::Suffixifier;
use crate::state::ConfigHandle;

/// Resolves search paths against the current configuration.
///
/// Resolvers built from clones of one handle share the observed default path.
#[derive(Debug, Clone)]
pub struct SearchPathResolver {
    config: ConfigHandle,
}

impl SearchPathResolver {
    /// Create a resolver bound to a configuration handle.
    pub fn new(config: ConfigHandle) -> Self {
        Self { config }
    }

    /// The configuration handle this resolver reads.
    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    /// The default search path with persistent schemas appended.
    ///
    /// The session's path is read on first use and recorded in the handle;
    /// later calls, from any resolver on the same handle, reuse it until
    /// [`invalidate`](Self::invalidate) or a configuration reload.
    pub async fn default_search_path<C>(&self, conn: &C) -> Result<String, StrataError>
    where
        C: SchemaConnection + ?Sized,
    {
        let observed = self.observed_path(conn).await?;
        let config = self.config.current();

        let mut path = SearchPath::parse(&observed);
        path.extend(config.persistent_schemas.iter().cloned());
        Ok(path.to_string())
    }

    /// Full search path for one schema or a comma-separated list.
    ///
    /// Deterministic for a given configuration: components are suffixified,
    /// each persistent schema is appended once, duplicates are dropped.
    pub fn path_for(&self, schema: &str) -> String {
        path_for(&self.config.current(), schema)
    }

    /// Check whether a name is the default path or one of its components.
    pub async fn matches_default_search_path<C>(
        &self,
        conn: &C,
        name: &str,
    ) -> Result<bool, StrataError>
    where
        C: SchemaConnection + ?Sized,
    {
        let default_path = self.default_search_path(conn).await?;
        Ok(default_path == name || split_components(&default_path).any(|c| c == name))
    }

    /// Forget the observed session path.
    pub fn invalidate(&self) {
        self.config.forget_search_path();
        tracing::debug!("Default search path cache invalidated");
    }

    async fn observed_path<C>(&self, conn: &C) -> Result<String, StrataError>
    where
        C: SchemaConnection + ?Sized,
    {
        let epoch = self.config.reload_epoch();
        if let Some(path) = self.config.observed_search_path() {
            return Ok(path);
        }

        let raw = SearchPath::parse(&conn.search_path().await?).to_string();
        let config = self.config.current();
        let path = Suffixifier::from_config(&config).unsuffixify(&raw);
        tracing::debug!(search_path = %path, epoch, "Observed default search path");

        // a concurrent observer may have raced us; the first value is kept
        Ok(self.config.record_search_path(epoch, path))
    }
}

/// Full search path for `schema` under `config`.
pub fn path_for(config: &TenancyConfig, schema: &str) -> String {
    let suffixifier = Suffixifier::from_config(config);

    let mut path = SearchPath::parse(&suffixifier.suffixify(schema));
    let requested: Vec<&str> = split_components(schema).collect();
    for persistent in &config.persistent_schemas {
        if !requested.contains(&persistent.as_str()) {
            path.push(suffixifier.suffixify(persistent));
        }
    }
    path.to_string()
}
