//! Store connection and harness setup at process start, teardown at exit.
//!
//! [`prepare`] turns an [`AppConfig`] into ready-to-serve [`AppState`]:
//!
//! 1. Connect every database. With the harness enabled, stores are opened
//!    pinned, which suspends autocommit and per-request connection
//!    recycling for the life of the process.
//! 2. Ensure the `tasks` schema exists, outside any scope.
//! 3. Build and start the [`ScopeManager`] and, if configured, open the
//!    first scope.
//!
//! [`teardown`] undoes all of it on shutdown.

use std::sync::Arc;

use atomic_db::registry::DEFAULT_ALIAS;
use atomic_db::{ConnectionMode, Store, StoreError, StoreId, StoreRegistry, TaskStore};
use atomic_scope::{ScopeError, ScopeManager};

use crate::config::AppConfig;
use crate::state::AppState;

/// Errors that can occur while preparing the server.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// A store could not be connected or prepared.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The scope manager could not be started.
    #[error("scope error: {0}")]
    Scope(#[from] ScopeError),
}

/// Connect stores and build the shared application state.
///
/// # Errors
///
/// Returns [`StartupError`] if a store cannot be reached or the harness
/// cannot open its first scope.
pub async fn prepare(config: &AppConfig) -> Result<Arc<AppState>, StartupError> {
    let mode = if config.atomic.enabled {
        ConnectionMode::Pinned
    } else {
        ConnectionMode::PerRequest
    };

    let mut stores = Vec::with_capacity(config.databases.len());
    for db in &config.databases {
        stores.push(Arc::new(Store::connect(&db.to_store_config(), mode).await?));
    }

    let enrolled: &[String] = if config.atomic.enabled {
        config.atomic.enrolled.as_slice()
    } else {
        &[]
    };
    let registry = Arc::new(StoreRegistry::new(stores, enrolled)?);

    {
        let store = registry.require(&StoreId::new(DEFAULT_ALIAS))?;
        let mut conn = store.acquire().await?;
        TaskStore::new(&mut conn).ensure_schema().await?;
    }

    let mut state = AppState::new(Arc::clone(&registry));
    if !config.atomic.enabled {
        tracing::info!(mode = ?mode, "Atomic harness disabled");
        return Ok(Arc::new(state));
    }

    let manager = Arc::new(ScopeManager::new(registry));
    manager.start().await?;
    if config.atomic.begin_on_start {
        manager.enter_scope().await?;
    }

    tracing::warn!(
        stores = ?manager.store_ids(),
        begin_on_start = config.atomic.begin_on_start,
        "Atomic harness enabled; autocommit is suspended. Never run this in production"
    );

    state = state.with_scope(manager);
    if let Some(path) = &config.atomic.fixtures {
        state = state.with_fixtures(path.clone());
    }
    Ok(Arc::new(state))
}

/// Roll back any open scope and close every connection.
pub async fn teardown(state: &AppState) {
    match &state.scope {
        Some(manager) => {
            if let Err(e) = manager.shutdown().await {
                tracing::error!(error = %e, "Rollback during shutdown failed");
            }
        }
        None => state.registry.close_all().await,
    }
}
