//! Shared configuration state.
//!
//! One `ConfigHandle` is created at startup and cloned into every component.
//! Readers take an `Arc` snapshot per operation, so a reconfiguration never
//! tears a half-updated config out from under an operation in flight.

use crate::error::StrataError;
use crate::models::TenancyConfig;

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

struct Inner {
    config: RwLock<Arc<TenancyConfig>>,
    /// Bumped on every reload; caches derived from the session compare against it.
    reload_epoch: AtomicU64,
    /// Default search path as first observed on a session, with its epoch.
    observed_search_path: Mutex<Option<(u64, String)>>,
}

/// Cloneable handle to the process-wide tenancy configuration.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<Inner>,
}

impl ConfigHandle {
    /// Create a handle holding the given configuration.
    pub fn new(config: TenancyConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config: RwLock::new(Arc::new(config)),
                reload_epoch: AtomicU64::new(0),
                observed_search_path: Mutex::new(None),
            }),
        }
    }

    /// Current configuration snapshot.
    pub fn current(&self) -> Arc<TenancyConfig> {
        self.inner.config.read().clone()
    }

    /// Atomically replace the configuration with an edited copy.
    ///
    /// The edited copy is validated first; on failure the old configuration
    /// stays in place.
    pub fn reconfigure<F>(&self, edit: F) -> Result<Arc<TenancyConfig>, StrataError>
    where
        F: FnOnce(&mut TenancyConfig),
    {
        let mut guard = self.inner.config.write();
        let mut next = TenancyConfig::clone(&guard);
        edit(&mut next);
        next.validate()?;

        let next = Arc::new(next);
        *guard = next.clone();
        tracing::info!(
            suffix = ?next.suffix(),
            persistent_schemas = ?next.persistent_schemas,
            "Tenancy configuration replaced"
        );
        Ok(next)
    }

    /// Reset to defaults and invalidate session-derived caches.
    pub fn reload(&self) {
        *self.inner.config.write() = Arc::new(TenancyConfig::default());
        let epoch = self.inner.reload_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        *self.inner.observed_search_path.lock() = None;
        tracing::debug!(epoch, "Tenancy configuration reloaded");
    }

    /// Number of reloads so far.
    pub fn reload_epoch(&self) -> u64 {
        self.inner.reload_epoch.load(Ordering::SeqCst)
    }

    /// The default search path recorded under the current epoch, if any.
    pub fn observed_search_path(&self) -> Option<String> {
        let epoch = self.reload_epoch();
        self.inner
            .observed_search_path
            .lock()
            .as_ref()
            .filter(|(observed_at, _)| *observed_at == epoch)
            .map(|(_, path)| path.clone())
    }

    /// Record the default search path observed under `epoch`.
    ///
    /// The first recording per epoch wins; the winning path is returned.
    pub fn record_search_path(&self, epoch: u64, path: String) -> String {
        let mut observed = self.inner.observed_search_path.lock();
        if let Some((_, existing)) = observed.as_ref().filter(|(at, _)| *at == epoch) {
            return existing.clone();
        }
        *observed = Some((epoch, path.clone()));
        path
    }

    /// Forget the recorded default search path.
    pub fn forget_search_path(&self) {
        *self.inner.observed_search_path.lock() = None;
    }
}

impl Default for ConfigHandle {
    fn default() -> Self {
        Self::new(TenancyConfig::default())
    }
}

impl std::fmt::Debug for ConfigHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigHandle")
            .field("config", &self.current())
            .field("reload_epoch", &self.reload_epoch())
            .finish()
    }
}
