//! Tenant schema lifecycle on one live connection.
//!
//! [`SchemaRegistry`] lists, creates, drops and switches schemas. Switching
//! replaces the connection's search path wholesale; [`SchemaRegistry::with_schema`]
//! switches for the duration of a future and always switches back.
//!
//! A scope whose future is dropped before it finishes (cancelled by a timeout,
//! or unwinding from a panic) cannot await its restore. It records the path to
//! restore instead, and the registry applies it before its next search-path
//! operation or on [`SchemaRegistry::recover`].

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::StrataError;
use crate::models::overrides::SHARED_SCHEMA;
use crate::models::schema_name::MAX_SCHEMA_NAME_LEN;
use crate::models::search_path::split_components;
use crate::models::{DatabaseConfig, SchemaName, SchemaOverrides, SearchPath};
use crate::services::connection::SchemaConnection;
use crate::services::duplicator::{DuplicateOptions, Duplicator};
use crate::services::migrator::ModelLayer;
use crate::services::search_path::SearchPathResolver;
use crate::services::suffix::{is_user_schema, Suffixifier};
use crate::state::ConfigHandle;

/// Options for [`SchemaRegistry::list`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOptions {
    /// Include the `public` schema.
    pub include_public: bool,
    /// Return names with the environment suffix.
    pub suffixed: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self { include_public: true, suffixed: false }
    }
}

/// Options for [`SchemaRegistry::create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateOptions {
    /// Skip the reserved-name check.
    pub force: bool,
    /// Copy the structure of `public` into the new schema.
    pub load_structure: bool,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self { force: false, load_structure: true }
    }
}

/// Open scoped switches and a restore left behind by an interrupted one.
#[derive(Debug, Default)]
struct Scopes {
    /// Path each open scope restores, outermost first.
    previous: Vec<String>,
    /// Path to restore, and the depth of the scope that left it.
    interrupted: Option<(usize, String)>,
}

/// One open scoped switch. Dropping it unfinished defers the restore.
struct ScopeGuard<'a> {
    scopes: &'a Mutex<Scopes>,
    depth: usize,
    finished: bool,
}

impl<'a> ScopeGuard<'a> {
    fn open(scopes: &'a Mutex<Scopes>, previous: String) -> Self {
        let mut state = scopes.lock();
        let depth = state.previous.len();
        state.previous.push(previous);
        Self { scopes, depth, finished: false }
    }

    /// Close the scope after its path was restored.
    fn finish(mut self) {
        self.finished = true;
        let mut state = self.scopes.lock();
        state.previous.truncate(self.depth);
        // the restore just applied supersedes anything an inner scope left
        if state.interrupted.as_ref().is_some_and(|(depth, _)| *depth >= self.depth) {
            state.interrupted = None;
        }
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let mut state = self.scopes.lock();
        if state.previous.len() <= self.depth {
            return;
        }
        let path = state.previous[self.depth].clone();
        state.previous.truncate(self.depth);
        tracing::warn!(search_path = %path, depth = self.depth, "Scoped switch interrupted");
        state.interrupted = Some((self.depth, path));
    }
}

/// Schema operations against a single connection.
///
/// Methods take `&self` and are not serialized: one registry serves one
/// logical tenant context at a time.
pub struct SchemaRegistry<C: SchemaConnection> {
    conn: C,
    config: ConfigHandle,
    database: DatabaseConfig,
    resolver: SearchPathResolver,
    models: Option<Arc<dyn ModelLayer>>,
    scopes: Mutex<Scopes>,
}

impl<C: SchemaConnection> SchemaRegistry<C> {
    /// Create a registry.
    ///
    /// `database` is what the dump and load clients connect with; it should
    /// point at the same database as `conn`.
    pub fn new(conn: C, config: ConfigHandle, database: DatabaseConfig) -> Self {
        let resolver = SearchPathResolver::new(config.clone());
        Self { conn, config, database, resolver, models: None, scopes: Mutex::default() }
    }

    /// Attach the model layer whose column cache is reset after structural
    /// changes.
    pub fn with_model_layer(mut self, models: Arc<dyn ModelLayer>) -> Self {
        self.models = Some(models);
        self
    }

    /// The underlying connection.
    pub fn connection(&self) -> &C {
        &self.conn
    }

    /// The configuration handle.
    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    /// Connection settings for the external clients.
    pub fn database(&self) -> &DatabaseConfig {
        &self.database
    }

    /// The search path resolver.
    pub fn resolver(&self) -> &SearchPathResolver {
        &self.resolver
    }

    /// Entity bindings for the current configuration.
    pub fn overrides(&self) -> SchemaOverrides {
        SchemaOverrides::from_config(&self.config.current())
    }

    // ========== Listing ==========

    /// Names of all non-system schemas, in catalog order.
    pub async fn list(&self, options: ListOptions) -> Result<Vec<String>, StrataError> {
        let names = self.conn.namespaces(options.include_public).await?;
        if options.suffixed {
            return Ok(names);
        }

        let config = self.config.current();
        let suffixifier = Suffixifier::from_config(&config);
        Ok(names.iter().map(|name| suffixifier.unsuffixify(name)).collect())
    }

    /// Check that every component of a schema name or path exists.
    ///
    /// The `$user` pseudo-schema always counts as present. An input with no
    /// components does not exist.
    pub async fn exists(&self, name: &str) -> Result<bool, StrataError> {
        let config = self.config.current();
        let path = Suffixifier::from_config(&config).suffixify(name);
        let wanted: Vec<&str> = split_components(&path).collect();
        if wanted.is_empty() {
            return Ok(false);
        }

        let known = self.list(ListOptions { include_public: true, suffixed: true }).await?;
        let missing: Vec<&str> = wanted
            .into_iter()
            .filter(|c| !is_user_schema(c) && !known.iter().any(|k| k == c))
            .collect();

        if !missing.is_empty() {
            tracing::debug!(path = %path, ?missing, "Schema components missing");
        }
        Ok(missing.is_empty())
    }

    // ========== Lifecycle ==========

    /// Create a schema, returning its suffixed name.
    ///
    /// With `load_structure` the structure of `public` is copied in and the
    /// connection is left switched into the new schema. Without it the schema
    /// is created empty and the search path is untouched.
    pub async fn create(&self, name: &str, options: CreateOptions) -> Result<String, StrataError> {
        let config = self.config.current();
        let schema = SchemaName::parse(name, config.suffix(), options.force)?;
        let suffixed = Suffixifier::from_config(&config).suffixify(schema.as_str());

        if suffixed.len() > MAX_SCHEMA_NAME_LEN {
            return Err(StrataError::invalid_schema_name(
                suffixed,
                format!("longer than {MAX_SCHEMA_NAME_LEN} characters with the suffix"),
            ));
        }
        if self.exists(&suffixed).await? {
            return Err(StrataError::schema_exists(suffixed));
        }

        if options.load_structure {
            Duplicator::new(&self.conn, config.clone(), &self.database)
                .duplicate(SHARED_SCHEMA, schema.as_str(), DuplicateOptions::default())
                .await?;
            self.switch(&suffixed).await?;
        } else {
            self.conn.create_schema(&suffixed).await?;
        }
        self.reset_column_information();

        tracing::info!(
            schema = %suffixed,
            load_structure = options.load_structure,
            "Schema created"
        );
        Ok(suffixed)
    }

    /// Create a schema and run `f` inside it.
    ///
    /// With `load_structure` the connection stays in the new schema after `f`;
    /// otherwise `f` runs as a scoped switch.
    pub async fn create_with<F, Fut>(
        &self,
        name: &str,
        options: CreateOptions,
        f: F,
    ) -> Result<String, StrataError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), StrataError>>,
    {
        let suffixed = self.create(name, options).await?;
        if options.load_structure {
            f().await?;
        } else {
            self.with_schema(&suffixed, f).await?;
        }
        Ok(suffixed)
    }

    /// Drop a schema and everything in it.
    pub async fn drop(&self, name: &str) -> Result<(), StrataError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StrataError::argument("schema name must be supplied"));
        }

        let config = self.config.current();
        let suffixed = Suffixifier::from_config(&config).suffixify(name);

        match self.conn.drop_schema(&suffixed).await {
            Ok(()) => {
                tracing::info!(schema = %suffixed, "Schema dropped");
                self.reset_column_information();
                Ok(())
            }
            Err(e) if e.is_missing_relation() => {
                tracing::warn!(schema = %suffixed, error = %e, "Drop of missing schema");
                Err(StrataError::schema_not_found_with_source(suffixed, e))
            }
            Err(e) => Err(e),
        }
    }

    /// Copy one schema into another, returning the suffixed target.
    pub async fn duplicate(
        &self,
        from: &str,
        to: &str,
        options: DuplicateOptions,
    ) -> Result<String, StrataError> {
        let target = Duplicator::new(&self.conn, self.config.current(), &self.database)
            .duplicate(from, to, options)
            .await?;
        self.reset_column_information();
        Ok(target)
    }

    // ========== Switching ==========

    /// Switch the connection into a schema, or a comma-separated list.
    ///
    /// An empty name or `public` resets to the default search path. The new
    /// path stays active until the next switch.
    pub async fn switch(&self, name: &str) -> Result<(), StrataError> {
        self.recover().await?;
        // observe the session's path before the first switch replaces it
        self.resolver.default_search_path(&self.conn).await?;

        let name = name.trim();
        if name.is_empty() || name == SHARED_SCHEMA {
            return self.reset().await;
        }

        let path = self.resolver.path_for(name);
        if !self.exists(name).await? {
            return Err(StrataError::schema_not_found(path));
        }
        self.apply_path(&path).await
    }

    /// Run `f` with `name` active, then switch back to the path that was
    /// active before.
    ///
    /// The previous path is restored on every exit. When `f` fails its error
    /// is returned even if restoring also fails. If the returned future is
    /// dropped before completion, the restore happens on the registry's next
    /// search-path operation.
    pub async fn with_schema<F, Fut, T>(&self, name: &str, f: F) -> Result<T, StrataError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, StrataError>>,
    {
        self.recover().await?;
        let previous = self.conn.search_path().await?;
        let guard = ScopeGuard::open(&self.scopes, previous.clone());

        if let Err(e) = self.switch(name).await {
            guard.finish();
            return Err(e);
        }

        let result = f().await;
        let restored = self.conn.set_search_path(&previous).await;
        guard.finish();

        match (result, restored) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(restore_err)) => {
                tracing::error!(search_path = %previous, error = %restore_err, "Failed to restore search path");
                Err(restore_err)
            }
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(restore_err)) => {
                tracing::error!(
                    search_path = %previous,
                    error = %restore_err,
                    "Failed to restore search path after scoped failure"
                );
                Err(e)
            }
        }
    }

    /// Apply the restore left by an interrupted scoped switch, if any.
    ///
    /// Returns whether a restore was applied. Search-path operations call this
    /// themselves; call it directly before using [`connection`](Self::connection)
    /// after a scoped switch may have been cancelled.
    pub async fn recover(&self) -> Result<bool, StrataError> {
        let pending = self.scopes.lock().interrupted.take();
        let Some((depth, path)) = pending else {
            return Ok(false);
        };

        if let Err(e) = self.conn.set_search_path(&path).await {
            let mut scopes = self.scopes.lock();
            if scopes.interrupted.is_none() {
                scopes.interrupted = Some((depth, path));
            }
            return Err(e);
        }
        tracing::info!(search_path = %path, "Restored search path after interrupted scope");
        Ok(true)
    }

    /// Switch back to the default search path.
    pub async fn reset(&self) -> Result<(), StrataError> {
        self.recover().await?;
        let default_path = self.resolver.default_search_path(&self.conn).await?;
        let path = self.resolver.path_for(&default_path);
        self.apply_path(&path).await
    }

    /// Full search path `switch` would apply for a name.
    pub fn schema_search_path_for(&self, name: &str) -> String {
        self.resolver.path_for(name)
    }

    // ========== Current schema ==========

    /// The active search path, normalized, unsuffixed unless `suffixed`.
    pub async fn current_schema(&self, suffixed: bool) -> Result<String, StrataError> {
        self.recover().await?;
        let raw = self.conn.search_path().await?;
        let path = SearchPath::parse(&raw).to_string();
        if suffixed {
            return Ok(path);
        }
        let config = self.config.current();
        Ok(Suffixifier::from_config(&config).unsuffixify(&path))
    }

    /// The active search path as a list of unsuffixed components.
    pub async fn current_schemas(&self) -> Result<Vec<String>, StrataError> {
        let path = self.current_schema(false).await?;
        Ok(SearchPath::parse(&path).into())
    }

    /// Check whether the default search path is active.
    pub async fn is_default_schema(&self) -> Result<bool, StrataError> {
        let default_path = self.resolver.default_search_path(&self.conn).await?;
        Ok(self.current_schema(false).await? == default_path)
    }

    /// Reset the model layer's column cache, if one is attached.
    pub fn reset_column_information(&self) {
        if let Some(models) = &self.models {
            models.reset_column_information();
        }
    }

    async fn apply_path(&self, path: &str) -> Result<(), StrataError> {
        match self.conn.set_search_path(path).await {
            Ok(()) => {
                tracing::debug!(search_path = path, "Switched schema");
                Ok(())
            }
            Err(e) if e.is_missing_relation() => {
                tracing::warn!(
                    search_path = path,
                    error = %e,
                    "Relation missing while switching search path"
                );
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}
