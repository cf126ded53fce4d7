//! A single harness-owned transaction on one store.

use std::sync::Arc;

use atomic_db::{Store, StoreError, StoreId};
use tracing::{Instrument, Span};

/// Whether a [`TransactionHandle`] is still holding its transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// The transaction is open.
    Open,
    /// The transaction has been exited.
    Closed,
}

/// One open unit of work against a single store.
///
/// Handles are created and owned by the scope manager only. They are
/// flagged as harness-driven, and every primitive they issue runs inside
/// an `atomic_scope` span carrying that flag, so log output can tell them
/// apart from a request's own transactions.
#[derive(Debug)]
pub struct TransactionHandle {
    store: Arc<Store>,
    state: HandleState,
    rollback: bool,
    harness: bool,
    span: Span,
}

impl TransactionHandle {
    fn new(store: Arc<Store>, harness: bool) -> Self {
        let span = tracing::info_span!("atomic_scope", store = %store.id(), harness);
        Self {
            store,
            state: HandleState::Open,
            rollback: false,
            harness,
            span,
        }
    }

    /// Open and enter a harness transaction on `store`.
    ///
    /// # Errors
    ///
    /// Returns the store's error if `BEGIN` fails.
    pub async fn begin(store: Arc<Store>) -> Result<Self, StoreError> {
        let handle = Self::new(store, true);
        handle
            .store
            .begin_raw()
            .instrument(handle.span.clone())
            .await?;
        handle.span.in_scope(|| tracing::debug!("Entered transaction"));
        Ok(handle)
    }

    /// Alias of the owning store.
    pub fn store_id(&self) -> &StoreId {
        self.store.id()
    }

    /// Current state.
    pub const fn state(&self) -> HandleState {
        self.state
    }

    /// Whether the handle will discard its work on exit.
    pub const fn is_marked_for_rollback(&self) -> bool {
        self.rollback
    }

    /// Whether the transaction was opened by the harness.
    pub const fn is_harness(&self) -> bool {
        self.harness
    }

    /// Force the transaction to roll back on exit.
    pub const fn set_rollback(&mut self) {
        self.rollback = true;
    }

    /// Exit the transaction, rolling back if marked and committing otherwise.
    ///
    /// The handle is closed even if the primitive fails. Exiting a closed
    /// handle does nothing.
    ///
    /// # Errors
    ///
    /// Returns the store's error if `ROLLBACK` or `COMMIT` fails.
    pub async fn exit(&mut self) -> Result<(), StoreError> {
        if self.state == HandleState::Closed {
            return Ok(());
        }
        self.state = HandleState::Closed;

        let span = self.span.clone();
        if self.rollback {
            self.store.rollback_raw().instrument(span.clone()).await?;
            span.in_scope(|| tracing::debug!("Rolled back transaction"));
        } else {
            self.store.commit_raw().instrument(span.clone()).await?;
            span.in_scope(|| tracing::warn!("Committed transaction"));
        }
        Ok(())
    }
}
