//! Running migrations across tenant schemas.
//!
//! Migration execution and model metadata belong to the host application;
//! they are reached through [`MigrationRunner`] and [`ModelLayer`].

use async_trait::async_trait;

use crate::error::StrataError;
use crate::services::connection::SchemaConnection;
use crate::services::registry::{ListOptions, SchemaRegistry};

/// Runs migrations against whatever search path is active.
#[async_trait]
pub trait MigrationRunner: Send + Sync {
    /// Versions applied in the active schema.
    async fn applied_versions(&self) -> Result<Vec<String>, StrataError>;

    /// Apply every pending migration to the active schema.
    async fn run_pending(&self) -> Result<(), StrataError>;
}

/// Model metadata that caches table columns.
pub trait ModelLayer: Send + Sync {
    /// Drop cached column information so the next lookup re-reads it.
    fn reset_column_information(&self);
}

/// Migrates one schema or all of them.
pub struct Migrator<'r, C: SchemaConnection, M: MigrationRunner> {
    registry: &'r SchemaRegistry<C>,
    runner: M,
}

impl<'r, C: SchemaConnection, M: MigrationRunner> Migrator<'r, C, M> {
    /// Create a migrator.
    pub fn new(registry: &'r SchemaRegistry<C>, runner: M) -> Self {
        Self { registry, runner }
    }

    /// Migrate a single schema. An empty name or `public` migrates the
    /// default search path.
    pub async fn migrate(&self, schema: &str) -> Result<(), StrataError> {
        tracing::info!(schema, "Migrating schema");
        let result = self.registry.with_schema(schema, || self.runner.run_pending()).await;
        self.registry.reset_column_information();
        result
    }

    /// Migrate the default search path, then every tenant schema.
    ///
    /// Stops at the first failure. Returns the tenant schemas migrated.
    pub async fn migrate_all(&self) -> Result<Vec<String>, StrataError> {
        self.migrate("").await?;

        let schemas = self
            .registry
            .list(ListOptions { include_public: false, suffixed: false })
            .await?;
        for schema in &schemas {
            self.migrate(schema).await?;
        }

        tracing::info!(count = schemas.len(), "Migrated all schemas");
        Ok(schemas)
    }

    /// Migration versions applied in a schema.
    pub async fn versions(&self, schema: &str) -> Result<Vec<String>, StrataError> {
        self.registry.with_schema(schema, || self.runner.applied_versions()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DatabaseConfig, TenancyConfig};
    use crate::services::connection::SchemaConnection;
    use crate::state::ConfigHandle;
    use crate::test_support::MemoryConnection;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Records the search path each call saw.
    struct RecordingRunner<'c> {
        conn: &'c MemoryConnection,
        seen: parking_lot::Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl<'c> MigrationRunner for RecordingRunner<'c> {
        async fn applied_versions(&self) -> Result<Vec<String>, StrataError> {
            let path = self.conn.search_path().await?;
            Ok(vec![format!("20240101000000@{path}")])
        }

        async fn run_pending(&self) -> Result<(), StrataError> {
            let path = self.conn.current_path();
            self.seen.lock().push(path.clone());
            if self.fail_on.is_some_and(|schema| path.starts_with(schema)) {
                return Err(StrataError::internal("migration failed"));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingModels(AtomicUsize);

    impl ModelLayer for CountingModels {
        fn reset_column_information(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn registry(conn: &MemoryConnection) -> SchemaRegistry<&MemoryConnection> {
        SchemaRegistry::new(conn, ConfigHandle::new(TenancyConfig::default()), DatabaseConfig::new("app"))
    }

    #[tokio::test]
    async fn test_migrate_all_visits_every_schema() {
        let conn = MemoryConnection::new(&["acme", "beta"]);
        let models = Arc::new(CountingModels::default());
        let registry = registry(&conn).with_model_layer(models.clone());
        let runner = RecordingRunner { conn: &conn, seen: Default::default(), fail_on: None };
        let migrator = Migrator::new(&registry, runner);

        let migrated = migrator.migrate_all().await.unwrap();

        assert_eq!(migrated, vec!["acme", "beta"]);
        assert_eq!(*migrator.runner.seen.lock(), vec!["\"$user\",public", "acme", "beta"]);
        assert_eq!(models.0.load(Ordering::SeqCst), 3);
        assert_eq!(conn.current_path(), "\"$user\", public");
    }

    #[tokio::test]
    async fn test_migrate_failure_restores_path() {
        let conn = MemoryConnection::new(&["acme", "beta"]);
        let registry = registry(&conn);
        let runner = RecordingRunner { conn: &conn, seen: Default::default(), fail_on: Some("beta") };
        let migrator = Migrator::new(&registry, runner);

        assert!(migrator.migrate_all().await.is_err());
        assert_eq!(conn.current_path(), "\"$user\", public");
    }

    #[tokio::test]
    async fn test_versions_run_in_schema() {
        let conn = MemoryConnection::new(&["acme"]);
        let registry = registry(&conn);
        let runner = RecordingRunner { conn: &conn, seen: Default::default(), fail_on: None };
        let migrator = Migrator::new(&registry, runner);

        assert_eq!(migrator.versions("acme").await.unwrap(), vec!["20240101000000@acme"]);
        assert!(migrator.versions("missing").await.unwrap_err().is_not_found());
    }
}
