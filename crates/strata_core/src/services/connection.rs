//! Database connections with deadpool-postgres.
//!
//! The registry works against the [`SchemaConnection`] trait: a single live
//! session whose `search_path` it reads and replaces. [`PooledConnection`] is
//! the production implementation.

use crate::error::StrataError;
use crate::models::schema_name::quote_ident;
use crate::models::DatabaseConfig;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use std::time::Duration;
use tokio_postgres::NoTls;

/// Catalog query for non-system namespaces, `public` included.
const NAMESPACES_SQL: &str = r#"
    SELECT nspname
    FROM pg_catalog.pg_namespace
    WHERE nspname !~ '^pg_.*'
      AND nspname != 'information_schema'
"#;

/// Run when a connection goes back to the pool, so the next borrower starts
/// on the server's default search path.
const RECYCLE_SQL: &str = "RESET search_path";

/// Same as [`NAMESPACES_SQL`] without `public`.
const NAMESPACES_WITHOUT_PUBLIC_SQL: &str = r#"
    SELECT nspname
    FROM pg_catalog.pg_namespace
    WHERE nspname !~ '^pg_.*'
      AND nspname != 'information_schema'
      AND nspname != 'public'
"#;

/// A live session whose schema context can be inspected and switched.
///
/// One active search path per connection: implementations are not expected to
/// serialize concurrent switches.
#[async_trait]
pub trait SchemaConnection: Send + Sync {
    /// The session's current search path, as PostgreSQL reports it.
    async fn search_path(&self) -> Result<String, StrataError>;

    /// Replace the session's search path.
    async fn set_search_path(&self, path: &str) -> Result<(), StrataError>;

    /// Non-system schema names, in catalog order.
    async fn namespaces(&self, include_public: bool) -> Result<Vec<String>, StrataError>;

    /// Create an empty schema.
    async fn create_schema(&self, name: &str) -> Result<(), StrataError>;

    /// Drop a schema and everything in it.
    async fn drop_schema(&self, name: &str) -> Result<(), StrataError>;

    /// Run one or more statements without results.
    async fn batch_execute(&self, sql: &str) -> Result<(), StrataError>;
}

#[async_trait]
impl<'a, T> SchemaConnection for &'a T
where
    T: SchemaConnection + ?Sized,
{
    async fn search_path(&self) -> Result<String, StrataError> {
        (**self).search_path().await
    }

    async fn set_search_path(&self, path: &str) -> Result<(), StrataError> {
        (**self).set_search_path(path).await
    }

    async fn namespaces(&self, include_public: bool) -> Result<Vec<String>, StrataError> {
        (**self).namespaces(include_public).await
    }

    async fn create_schema(&self, name: &str) -> Result<(), StrataError> {
        (**self).create_schema(name).await
    }

    async fn drop_schema(&self, name: &str) -> Result<(), StrataError> {
        (**self).drop_schema(name).await
    }

    async fn batch_execute(&self, sql: &str) -> Result<(), StrataError> {
        (**self).batch_execute(sql).await
    }
}

/// A managed pool of database connections.
pub struct ConnectionPool {
    /// Connection settings the pool was built from
    config: DatabaseConfig,
    /// The actual connection pool
    pool: Pool,
}

impl ConnectionPool {
    /// Create a new connection pool, validating connectivity with `SELECT 1`.
    pub async fn new(config: DatabaseConfig) -> Result<Self, StrataError> {
        Self::with_pool_config(config, 4, Duration::from_secs(30)).await
    }

    /// Create a connection pool with custom pool settings.
    ///
    /// # Arguments
    /// * `config` - Connection settings (URL or discrete credentials)
    /// * `max_size` - Maximum number of connections in the pool
    /// * `wait_timeout` - How long to wait when the pool is exhausted
    pub async fn with_pool_config(
        config: DatabaseConfig,
        max_size: usize,
        wait_timeout: Duration,
    ) -> Result<Self, StrataError> {
        let pg_config = config.to_pg_config()?;
        let connect_timeout = pg_config.get_connect_timeout().copied();

        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig { recycling_method: recycling_method() },
        );

        let pool = Pool::builder(manager)
            .max_size(max_size)
            .wait_timeout(Some(wait_timeout))
            .create_timeout(connect_timeout)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| StrataError::connection(format!("Failed to create pool: {e}")))?;

        let client = pool
            .get()
            .await
            .map_err(|e| StrataError::connection(format!("Failed to establish connection: {e}")))?;

        client
            .execute("SELECT 1", &[])
            .await
            .map_err(|e| StrataError::connection(format!("Connection validation failed: {e}")))?;

        tracing::info!(
            database = ?config.database,
            host = ?config.host,
            max_size,
            "Connection pool created successfully"
        );

        Ok(Self { config, pool })
    }

    /// Get the connection settings.
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Acquire a connection from the pool.
    ///
    /// The search path is reset when a connection is recycled, but within one
    /// borrow the session keeps whatever path the registry leaves on it, so
    /// hold on to one connection per registry instead of re-acquiring.
    pub async fn get(&self) -> Result<PooledConnection, StrataError> {
        let client = self.pool.get().await.map_err(|e| {
            StrataError::connection(format!("Failed to acquire connection: {e}"))
        })?;
        Ok(PooledConnection { client })
    }

    /// Close the pool, dropping all connections.
    pub fn close(&self) {
        self.pool.close();
        tracing::info!("Connection pool closed");
    }

    /// Check if the pool is closed.
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

/// Recycling for pooled sessions: a tenant path never outlives its borrow.
fn recycling_method() -> RecyclingMethod {
    RecyclingMethod::Custom(RECYCLE_SQL.to_string())
}

/// A connection acquired from the pool.
///
/// Automatically returns to the pool when dropped.
pub struct PooledConnection {
    client: deadpool_postgres::Client,
}

impl PooledConnection {
    /// Execute a query that returns rows.
    pub async fn query(
        &self,
        sql: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> Result<Vec<tokio_postgres::Row>, StrataError> {
        self.client.query(sql, params).await.map_err(StrataError::from)
    }

    /// Execute a statement that doesn't return rows.
    pub async fn execute(
        &self,
        sql: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> Result<u64, StrataError> {
        self.client.execute(sql, params).await.map_err(StrataError::from)
    }
}

#[async_trait]
impl SchemaConnection for PooledConnection {
    async fn search_path(&self) -> Result<String, StrataError> {
        let rows = self.query("SELECT current_setting('search_path')", &[]).await?;
        rows.first()
            .map(|row| row.get(0))
            .ok_or_else(|| StrataError::internal("current_setting returned no rows"))
    }

    async fn set_search_path(&self, path: &str) -> Result<(), StrataError> {
        // set_config takes the path as a bind parameter, so it is never spliced into SQL
        self.execute("SELECT set_config('search_path', $1, false)", &[&path]).await?;
        tracing::trace!(search_path = path, "Search path set");
        Ok(())
    }

    async fn namespaces(&self, include_public: bool) -> Result<Vec<String>, StrataError> {
        let sql = if include_public { NAMESPACES_SQL } else { NAMESPACES_WITHOUT_PUBLIC_SQL };
        let rows = self.query(sql, &[]).await?;
        Ok(rows.into_iter().map(|row| row.get("nspname")).collect())
    }

    async fn create_schema(&self, name: &str) -> Result<(), StrataError> {
        let sql = format!("CREATE SCHEMA {}", quote_ident(name));
        self.client.batch_execute(&sql).await.map_err(StrataError::from)
    }

    async fn drop_schema(&self, name: &str) -> Result<(), StrataError> {
        let sql = format!("DROP SCHEMA {} CASCADE", quote_ident(name));
        self.client.batch_execute(&sql).await.map_err(StrataError::from)
    }

    async fn batch_execute(&self, sql: &str) -> Result<(), StrataError> {
        self.client.batch_execute(sql).await.map_err(StrataError::from)
    }
}
