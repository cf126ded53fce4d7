//! Transaction scope management for the atomic server.
//!
//! A *scope* is one open, uncommitted transaction on every enrolled store.
//! Tests drive the server through `begin` and `rollback`; everything the
//! HTTP pipeline writes in between lands inside the scope and disappears
//! when it is rolled back.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized --start--> ScopeClosed --enter--> ScopeOpen
//!                               ^                     |
//!                               +---rollback----------+
//! ScopeClosed | ScopeOpen --shutdown--> ShuttingDown --> Terminated
//! ```
//!
//! # Modules
//!
//! - [`handle`] -- a single harness-owned transaction on one store
//! - [`manager`] -- the [`ScopeManager`] and its [`Phase`] state machine
//! - [`error`] -- [`ScopeError`]

pub mod error;
pub mod handle;
pub mod manager;

pub use error::ScopeError;
pub use handle::{HandleState, TransactionHandle};
pub use manager::{Phase, ScopeManager};
