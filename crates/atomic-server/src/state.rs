//! Shared application state for the atomic server.
//!
//! [`AppState`] carries the store registry used by the request pipeline
//! and, when the harness is enabled, the [`ScopeManager`] used by the
//! control endpoints. Handlers never see transaction handles; they only
//! acquire connections from stores.

use std::path::PathBuf;
use std::sync::Arc;

use atomic_db::registry::DEFAULT_ALIAS;
use atomic_db::{Store, StoreId, StoreRegistry};
use atomic_scope::ScopeManager;

use crate::error::ApiError;

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Every configured store.
    pub registry: Arc<StoreRegistry>,
    /// Scope manager (present only when the harness is enabled).
    pub scope: Option<Arc<ScopeManager>>,
    /// SQL script run by `GET /atomic/setup/`.
    pub fixtures: Option<PathBuf>,
}

impl AppState {
    /// Create state for normal operation, without the harness.
    pub const fn new(registry: Arc<StoreRegistry>) -> Self {
        Self {
            registry,
            scope: None,
            fixtures: None,
        }
    }

    /// Attach a scope manager, enabling the control endpoints.
    #[must_use]
    pub fn with_scope(mut self, manager: Arc<ScopeManager>) -> Self {
        self.scope = Some(manager);
        self
    }

    /// Attach a fixture script for the `setup` endpoint.
    #[must_use]
    pub fn with_fixtures(mut self, path: PathBuf) -> Self {
        self.fixtures = Some(path);
        self
    }

    /// The store that backs the task resource.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Internal`] if no `default` store is configured.
    pub fn default_store(&self) -> Result<&Arc<Store>, ApiError> {
        self.registry
            .get(&StoreId::new(DEFAULT_ALIAS))
            .ok_or_else(|| ApiError::Internal("no `default` store configured".to_owned()))
    }

    /// The scope manager.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Internal`] if the harness is disabled.
    pub fn scope_manager(&self) -> Result<&Arc<ScopeManager>, ApiError> {
        self.scope
            .as_ref()
            .ok_or_else(|| ApiError::Internal("atomic harness not enabled".to_owned()))
    }
}
