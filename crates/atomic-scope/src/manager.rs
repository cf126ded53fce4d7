//! The process-wide transaction scope manager.
//!
//! [`ScopeManager`] owns the only mutable state of the harness: the
//! ordered list of open [`TransactionHandle`]s. It is created once by the
//! server, shared behind an [`Arc`] with the control endpoints, and every
//! operation on it runs under a single [`Mutex`]. Requests served inside
//! an open scope never touch the manager; they reach the same pinned
//! connections through the store layer.
//!
//! The set of stores is resolved from the [`StoreRegistry`] once, at
//! construction, so opening and rolling back always walk the same fixed
//! sequence in opposite directions.

use std::sync::Arc;

use atomic_db::{ConnectionMode, Store, StoreError, StoreId, StoreRegistry};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::ScopeError;
use crate::handle::TransactionHandle;

/// Observable state of the harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Constructed, stores not yet verified.
    Uninitialized,
    /// Running with no scope open.
    ScopeClosed,
    /// Running with a scope open.
    ScopeOpen,
    /// Rolling back and closing connections.
    ShuttingDown,
    /// Shut down; no further scopes can be opened.
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Uninitialized,
    Running,
    ShuttingDown,
    Terminated,
}

#[derive(Debug)]
struct Inner {
    lifecycle: Lifecycle,
    scope: Option<Vec<TransactionHandle>>,
}

/// Opens, rolls back and tears down transaction scopes.
#[derive(Debug)]
pub struct ScopeManager {
    registry: Arc<StoreRegistry>,
    slots: Vec<Arc<Store>>,
    inner: Mutex<Inner>,
}

impl ScopeManager {
    /// Create a manager over every enrolled store, mirrors included.
    pub fn new(registry: Arc<StoreRegistry>) -> Self {
        let slots = registry
            .list_stores(true)
            .iter()
            .filter_map(|id| registry.get(id).map(Arc::clone))
            .collect();

        Self {
            registry,
            slots,
            inner: Mutex::new(Inner {
                lifecycle: Lifecycle::Uninitialized,
                scope: None,
            }),
        }
    }

    /// Verify every enrolled store has autocommit suspended and move to
    /// [`Phase::ScopeClosed`].
    ///
    /// Calling it again while running is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ScopeError::StoreUnavailable`] if an enrolled store is not
    /// pinned, or [`ScopeError::ShutDown`] after shutdown.
    pub async fn start(&self) -> Result<(), ScopeError> {
        let mut inner = self.inner.lock().await;
        match inner.lifecycle {
            Lifecycle::Running => return Ok(()),
            Lifecycle::ShuttingDown | Lifecycle::Terminated => return Err(ScopeError::ShutDown),
            Lifecycle::Uninitialized => {}
        }

        if let Some(store) = self
            .slots
            .iter()
            .find(|s| s.mode() != ConnectionMode::Pinned)
        {
            return Err(ScopeError::StoreUnavailable {
                alias: store.id().to_string(),
                source: StoreError::NotPinned {
                    alias: store.id().to_string(),
                },
            });
        }

        inner.lifecycle = Lifecycle::Running;
        tracing::info!(stores = ?self.store_ids(), "Scope manager started");
        Ok(())
    }

    /// Open a transaction on every enrolled store, in registry order.
    ///
    /// Returns the stores in the order they were opened. If one store
    /// fails to begin, the stores already opened are rolled back before
    /// the error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`ScopeError::ScopeAlreadyOpen`] if a scope is open,
    /// [`ScopeError::StoreUnavailable`] if a store cannot begin, and
    /// [`ScopeError::NotStarted`] / [`ScopeError::ShutDown`] outside the
    /// running phases.
    pub async fn enter_scope(&self) -> Result<Vec<StoreId>, ScopeError> {
        let mut inner = self.inner.lock().await;
        ensure_running(inner.lifecycle)?;
        if inner.scope.is_some() {
            return Err(ScopeError::ScopeAlreadyOpen);
        }

        let mut handles = Vec::with_capacity(self.slots.len());
        for store in &self.slots {
            match TransactionHandle::begin(Arc::clone(store)).await {
                Ok(handle) => handles.push(handle),
                Err(source) => {
                    tracing::error!(store = %store.id(), error = %source, "Failed to open scope");
                    unwind(&mut handles).await;
                    return Err(ScopeError::StoreUnavailable {
                        alias: store.id().to_string(),
                        source,
                    });
                }
            }
        }

        let opened: Vec<StoreId> = handles.iter().map(|h| h.store_id().clone()).collect();
        tracing::info!(stores = ?opened, harness = true, "Atomic scope opened");
        inner.scope = Some(handles);
        Ok(opened)
    }

    /// Roll back the open scope, store by store in reverse registry order.
    ///
    /// Every store is attempted even if an earlier one fails, and the
    /// scope is cleared either way. Returns the stores in the order they
    /// were rolled back.
    ///
    /// A scope only exists while the manager is running, so before
    /// [`start`](Self::start) and after [`shutdown`](Self::shutdown) this
    /// fails with [`ScopeError::NoActiveScope`] as well.
    ///
    /// # Errors
    ///
    /// Returns [`ScopeError::NoActiveScope`] if no scope is open, or the
    /// first [`ScopeError::StoreUnavailable`] hit while rolling back.
    pub async fn exit_scope_with_rollback(&self) -> Result<Vec<StoreId>, ScopeError> {
        let mut inner = self.inner.lock().await;
        let handles = inner.scope.take().ok_or(ScopeError::NoActiveScope)?;
        rollback(handles).await
    }

    /// Close the connections of every configured store. Idempotent.
    ///
    /// An open scope is dropped; closing its connections discards the
    /// transactions on the database side.
    pub async fn close_all_connections(&self) {
        let mut inner = self.inner.lock().await;
        if inner.scope.take().is_some() {
            tracing::warn!("Closing connections with an open scope; its writes are discarded");
        }
        self.registry.close_all().await;
    }

    /// Roll back any open scope, then close all connections.
    ///
    /// After this returns the manager is [`Phase::Terminated`] and refuses
    /// new scopes. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the rollback error, if any. Connections are closed anyway.
    pub async fn shutdown(&self) -> Result<(), ScopeError> {
        let mut inner = self.inner.lock().await;
        if inner.lifecycle == Lifecycle::Terminated {
            return Ok(());
        }
        inner.lifecycle = Lifecycle::ShuttingDown;
        tracing::info!("Scope manager shutting down");

        let result = match inner.scope.take() {
            Some(handles) => rollback(handles).await.map(drop),
            None => Ok(()),
        };

        self.registry.close_all().await;
        inner.lifecycle = Lifecycle::Terminated;
        tracing::info!("Scope manager terminated");
        result
    }

    /// Current phase.
    pub async fn phase(&self) -> Phase {
        let inner = self.inner.lock().await;
        match inner.lifecycle {
            Lifecycle::Uninitialized => Phase::Uninitialized,
            Lifecycle::Running if inner.scope.is_some() => Phase::ScopeOpen,
            Lifecycle::Running => Phase::ScopeClosed,
            Lifecycle::ShuttingDown => Phase::ShuttingDown,
            Lifecycle::Terminated => Phase::Terminated,
        }
    }

    /// Whether a scope is open.
    pub async fn is_open(&self) -> bool {
        self.inner.lock().await.scope.is_some()
    }

    /// Enrolled stores in the order scopes open them.
    pub fn store_ids(&self) -> Vec<StoreId> {
        self.slots.iter().map(|s| s.id().clone()).collect()
    }

    /// The registry the manager was built from.
    pub const fn registry(&self) -> &Arc<StoreRegistry> {
        &self.registry
    }
}

const fn ensure_running(lifecycle: Lifecycle) -> Result<(), ScopeError> {
    match lifecycle {
        Lifecycle::Running => Ok(()),
        Lifecycle::Uninitialized => Err(ScopeError::NotStarted),
        Lifecycle::ShuttingDown | Lifecycle::Terminated => Err(ScopeError::ShutDown),
    }
}

async fn rollback(mut handles: Vec<TransactionHandle>) -> Result<Vec<StoreId>, ScopeError> {
    let mut rolled_back = Vec::with_capacity(handles.len());
    let mut first_error = None;

    for handle in handles.iter_mut().rev() {
        handle.set_rollback();
        match handle.exit().await {
            Ok(()) => rolled_back.push(handle.store_id().clone()),
            Err(source) => {
                tracing::error!(store = %handle.store_id(), error = %source, "Rollback failed");
                if first_error.is_none() {
                    first_error = Some(ScopeError::StoreUnavailable {
                        alias: handle.store_id().to_string(),
                        source,
                    });
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => {
            tracing::info!(stores = ?rolled_back, harness = true, "Atomic scope rolled back");
            Ok(rolled_back)
        }
    }
}

async fn unwind(handles: &mut [TransactionHandle]) {
    for handle in handles.iter_mut().rev() {
        handle.set_rollback();
        if let Err(e) = handle.exit().await {
            tracing::warn!(store = %handle.store_id(), error = %e, "Unwind rollback failed");
        }
    }
}
