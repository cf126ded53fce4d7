//! Error types for the data layer.
//!
//! All errors are propagated via [`StoreError`] which wraps the underlying
//! [`sqlx`] error with the store alias the operation was running against.

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The store's connections have already been closed.
    #[error("store `{alias}` is closed")]
    Closed {
        /// Alias of the closed store.
        alias: String,
    },

    /// A transaction primitive was issued against a store that still runs
    /// in per-request autocommit mode.
    #[error("store `{alias}` is not pinned; autocommit is still active")]
    NotPinned {
        /// Alias of the store.
        alias: String,
    },

    /// No store with the given alias is registered.
    #[error("unknown store: {0}")]
    UnknownStore(String),

    /// Two stores share the same alias.
    #[error("duplicate store alias: {0}")]
    DuplicateAlias(String),

    /// A row was not found.
    #[error("not found: {0}")]
    NotFound(String),
}
