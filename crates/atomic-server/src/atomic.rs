//! Control endpoints used by the end-to-end test driver.
//!
//! These routes are only mounted when the harness is enabled. Each one is
//! a thin adapter over the [`ScopeManager`](atomic_scope::ScopeManager);
//! failures are never swallowed and come back as a 500.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/atomic/begin/` | Open a scope on every enrolled store (204) |
//! | `GET` | `/atomic/setup/` | Run the fixture script, if any (200) |
//! | `GET` | `/atomic/rollback/` | Roll back and close the scope (204) |
//! | `GET` | `/atomic/status/` | Current phase and enrolled stores |

use std::sync::Arc;

use atomic_scope::Phase;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use crate::error::ApiError;
use crate::state::AppState;

/// Response body for `GET /atomic/status/`.
#[derive(Debug, serde::Serialize)]
pub struct StatusResponse {
    /// Current harness phase.
    pub phase: Phase,
    /// Enrolled stores in the order scopes open them.
    pub stores: Vec<String>,
}

/// Open a new scope.
pub async fn begin(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    state.scope_manager()?.enter_scope().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Load scenario fixtures into the `default` store.
///
/// Runs inside whatever scope is open, so the fixtures disappear with
/// the next rollback. Without a configured script this does nothing.
pub async fn setup(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    let Some(path) = &state.fixtures else {
        return Ok(StatusCode::OK);
    };

    let script = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ApiError::Fixture(format!("{}: {e}", path.display())))?;

    let mut conn = state.default_store()?.acquire().await?;
    sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(&script))
        .await
        .map_err(|e| ApiError::Fixture(format!("{}: {e}", path.display())))?;

    tracing::info!(fixtures = %path.display(), "Fixtures loaded");
    Ok(StatusCode::OK)
}

/// Roll back the open scope.
pub async fn rollback(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    state.scope_manager()?.exit_scope_with_rollback().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Report the harness phase.
pub async fn status(State(state): State<Arc<AppState>>) -> Result<Json<StatusResponse>, ApiError> {
    let manager = state.scope_manager()?;
    Ok(Json(StatusResponse {
        phase: manager.phase().await,
        stores: manager.store_ids().iter().map(ToString::to_string).collect(),
    }))
}
