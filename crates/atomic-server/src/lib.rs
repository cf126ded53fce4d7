//! HTTP server for end-to-end tests with test-controlled transaction scopes.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **Request pipeline** -- a small task resource (`/tasks/`) and a
//!   health check, served from the `default` store
//! - **Control endpoints** (`/atomic/begin/`, `/atomic/setup/`,
//!   `/atomic/rollback/`) that a test driver calls around each scenario,
//!   mounted only when the harness is enabled
//!
//! # Architecture
//!
//! With the harness enabled every enrolled store runs on a single pinned
//! connection with autocommit suspended. `begin` opens a transaction on
//! each of them; every request after that lands inside those transactions
//! until `rollback` discards them. No truncation or reseeding is needed
//! between scenarios.
//!
//! The harness is off by default and must be opted into (`CI=true` or
//! `atomic.enabled: true`). Never enable it in production.

pub mod atomic;
pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;

// Re-export primary types for convenience.
pub use config::{AppConfig, ConfigError};
pub use error::ApiError;
pub use router::build_router;
pub use server::{ServerError, run};
pub use state::AppState;
