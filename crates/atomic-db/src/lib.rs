//! Data layer for the atomic server.
//!
//! The atomic server runs end-to-end tests against a real database while
//! keeping one transaction open per store for as long as a test scope
//! lives. This crate owns everything that talks to the databases:
//!
//! ```text
//! StoreRegistry (enrolled aliases, stable order)
//!     |
//!     +-- Store "default" --+-- PerRequest: pooled connection per request (autocommit)
//!     |                     +-- Pinned:     one long-lived connection, never recycled
//!     +-- Store "replica"   (read mirror)
//!             |
//!             +-- TaskStore (demo `tasks` table served by the HTTP pipeline)
//! ```
//!
//! # Modules
//!
//! - [`store`] -- store configuration, connection modes and the acquisition hook
//! - [`registry`] -- ordered set of stores enrolled in scoped transactions
//! - [`task_store`] -- queries against the `tasks` table
//! - [`error`] -- shared error types

pub mod error;
pub mod registry;
pub mod store;
pub mod task_store;

// Re-export primary types for convenience.
pub use error::StoreError;
pub use registry::{StoreId, StoreRegistry};
pub use store::{ConnectionMode, Store, StoreConfig, StoreConn};
pub use task_store::{TaskRow, TaskStore};
