//! In-memory session used by unit tests.

use crate::error::StrataError;
use crate::services::connection::SchemaConnection;

use async_trait::async_trait;
use parking_lot::Mutex;

#[cfg(unix)]
use std::path::{Path, PathBuf};

/// Search path a fresh PostgreSQL session reports.
pub const FRESH_SEARCH_PATH: &str = "\"$user\", public";

/// Fake session tracking schemas and the search path in memory.
pub struct MemoryConnection {
    schemas: Mutex<Vec<String>>,
    search_path: Mutex<String>,
    path_history: Mutex<Vec<String>>,
    executed: Mutex<Vec<String>>,
    drop_error_code: Mutex<Option<String>>,
    set_path_error_code: Mutex<Option<String>>,
}

impl MemoryConnection {
    /// A session whose database holds `public` plus the given schemas.
    pub fn new(schemas: &[&str]) -> Self {
        let mut all = vec!["public".to_string()];
        all.extend(schemas.iter().map(|s| s.to_string()));
        Self {
            schemas: Mutex::new(all),
            search_path: Mutex::new(FRESH_SEARCH_PATH.to_string()),
            path_history: Mutex::new(Vec::new()),
            executed: Mutex::new(Vec::new()),
            drop_error_code: Mutex::new(None),
            set_path_error_code: Mutex::new(None),
        }
    }

    /// Current search path without going through the trait.
    pub fn current_path(&self) -> String {
        self.search_path.lock().clone()
    }

    /// Every path passed to `set_search_path`, in order.
    pub fn path_history(&self) -> Vec<String> {
        self.path_history.lock().clone()
    }

    /// Every statement passed to `batch_execute`, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }

    /// All schema names.
    pub fn schemas(&self) -> Vec<String> {
        self.schemas.lock().clone()
    }

    /// Make the next `drop_schema` fail with this SQLSTATE.
    pub fn fail_next_drop(&self, code: &str) {
        *self.drop_error_code.lock() = Some(code.to_string());
    }

    /// Make the next `set_search_path` fail with this SQLSTATE.
    pub fn fail_next_set_path(&self, code: &str) {
        *self.set_path_error_code.lock() = Some(code.to_string());
    }
}

fn driver_error(message: String, code: &str) -> StrataError {
    StrataError::query(message, None, None, None, Some(code.to_string()))
}

#[async_trait]
impl SchemaConnection for MemoryConnection {
    async fn search_path(&self) -> Result<String, StrataError> {
        Ok(self.search_path.lock().clone())
    }

    async fn set_search_path(&self, path: &str) -> Result<(), StrataError> {
        if let Some(code) = self.set_path_error_code.lock().take() {
            return Err(driver_error(format!("relation \"{path}\" does not exist"), &code));
        }
        *self.search_path.lock() = path.to_string();
        self.path_history.lock().push(path.to_string());
        Ok(())
    }

    async fn namespaces(&self, include_public: bool) -> Result<Vec<String>, StrataError> {
        Ok(self
            .schemas
            .lock()
            .iter()
            .filter(|s| include_public || s.as_str() != "public")
            .cloned()
            .collect())
    }

    async fn create_schema(&self, name: &str) -> Result<(), StrataError> {
        let mut schemas = self.schemas.lock();
        if schemas.iter().any(|s| s == name) {
            return Err(driver_error(format!("schema \"{name}\" already exists"), "42P06"));
        }
        schemas.push(name.to_string());
        Ok(())
    }

    async fn drop_schema(&self, name: &str) -> Result<(), StrataError> {
        if let Some(code) = self.drop_error_code.lock().take() {
            return Err(driver_error(format!("cannot drop schema {name}"), &code));
        }
        let mut schemas = self.schemas.lock();
        let before = schemas.len();
        schemas.retain(|s| s != name);
        if schemas.len() == before {
            return Err(driver_error(format!("schema \"{name}\" does not exist"), "3F000"));
        }
        Ok(())
    }

    async fn batch_execute(&self, sql: &str) -> Result<(), StrataError> {
        self.executed.lock().push(sql.to_string());
        Ok(())
    }
}

/// Write an executable `sh` script standing in for a database client.
#[cfg(unix)]
pub fn fake_client(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
