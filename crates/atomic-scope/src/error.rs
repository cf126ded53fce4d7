//! Error types for scope management.

use atomic_db::StoreError;

/// Errors raised by the [`ScopeManager`](crate::ScopeManager).
///
/// None of these are transient. A control request that fails with any of
/// them must surface the failure to the test driver.
#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    /// Rollback was requested while no scope is open.
    #[error("not inside an atomic scope")]
    NoActiveScope,

    /// Begin was requested while a scope is already open.
    #[error("an atomic scope is already open")]
    ScopeAlreadyOpen,

    /// A store's begin or rollback primitive failed.
    #[error("store `{alias}` unavailable: {source}")]
    StoreUnavailable {
        /// Alias of the failing store.
        alias: String,
        /// The underlying store error.
        #[source]
        source: StoreError,
    },

    /// The manager has not been started yet.
    #[error("scope manager not started")]
    NotStarted,

    /// The manager is shutting down or has terminated.
    #[error("scope manager is shut down")]
    ShutDown,
}
