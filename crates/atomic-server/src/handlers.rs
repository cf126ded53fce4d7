//! REST handlers for the task resource and health check.
//!
//! This is the ordinary request pipeline. It knows nothing about scopes:
//! every handler acquires a connection from the `default` store, and the
//! store decides whether that connection is pooled or pinned.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/health/` | Liveness check |
//! | `GET` | `/tasks/` | List tasks |
//! | `POST` | `/tasks/` | Create a task |
//! | `GET` | `/tasks/{id}/` | Get one task |
//! | `PUT` | `/tasks/{id}/` | Replace a task |
//! | `PATCH` | `/tasks/{id}/` | Partially update a task |
//! | `DELETE` | `/tasks/{id}/` | Delete a task |

use std::sync::Arc;

use atomic_db::{TaskRow, TaskStore};
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::error::ApiError;
use crate::state::AppState;

/// Maximum length of a task title.
const MAX_TITLE_LEN: usize = 200;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for creating or updating a task.
#[derive(Debug, Default, serde::Deserialize)]
pub struct TaskInput {
    /// Task title; required for `POST` and `PUT`.
    pub title: Option<String>,
    /// Completion flag; defaults to `false` on `POST` and `PUT`.
    pub completed: Option<bool>,
}

/// JSON representation of a task.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TaskResponse {
    /// Primary key.
    pub id: i64,
    /// Task title.
    pub title: String,
    /// Whether the task is done.
    pub completed: bool,
}

impl From<TaskRow> for TaskResponse {
    fn from(row: TaskRow) -> Self {
        Self {
            completed: row.is_completed(),
            id: row.id,
            title: row.title,
        }
    }
}

fn validate_title(title: Option<&str>) -> Result<&str, ApiError> {
    let title = title.map(str::trim).unwrap_or_default();
    if title.is_empty() {
        return Err(ApiError::Validation {
            field: "title",
            message: "This field is required.".to_owned(),
        });
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ApiError::Validation {
            field: "title",
            message: format!("Ensure this field has no more than {MAX_TITLE_LEN} characters."),
        });
    }
    Ok(title)
}

// ---------------------------------------------------------------------------
// GET /health/
// ---------------------------------------------------------------------------

/// Liveness check.
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// /tasks/
// ---------------------------------------------------------------------------

/// List all tasks ordered by id.
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<TaskResponse>>, ApiError> {
    let mut conn = state.default_store()?.acquire().await?;
    let rows = TaskStore::new(&mut conn).list().await?;
    Ok(Json(rows.into_iter().map(TaskResponse::from).collect()))
}

/// Create a task.
pub async fn create_task(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TaskInput>,
) -> Result<impl IntoResponse, ApiError> {
    let title = validate_title(body.title.as_deref())?;
    let mut conn = state.default_store()?.acquire().await?;
    let row = TaskStore::new(&mut conn)
        .create(title, body.completed.unwrap_or(false))
        .await?;
    Ok((StatusCode::CREATED, Json(TaskResponse::from(row))))
}

/// Fetch one task.
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<TaskResponse>, ApiError> {
    let mut conn = state.default_store()?.acquire().await?;
    let row = TaskStore::new(&mut conn).get(id).await?;
    Ok(Json(row.into()))
}

/// Replace a task's title and completion flag.
pub async fn update_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<TaskInput>,
) -> Result<Json<TaskResponse>, ApiError> {
    let title = validate_title(body.title.as_deref())?;
    let mut conn = state.default_store()?.acquire().await?;
    let row = TaskStore::new(&mut conn)
        .update(id, title, body.completed.unwrap_or(false))
        .await?;
    Ok(Json(row.into()))
}

/// Update only the fields present in the body.
pub async fn patch_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<TaskInput>,
) -> Result<Json<TaskResponse>, ApiError> {
    let mut conn = state.default_store()?.acquire().await?;
    let mut tasks = TaskStore::new(&mut conn);
    let current = tasks.get(id).await?;

    let title = match body.title.as_deref() {
        Some(t) => validate_title(Some(t))?.to_owned(),
        None => current.title.clone(),
    };
    let completed = body.completed.unwrap_or_else(|| current.is_completed());

    let row = tasks.update(id, &title, completed).await?;
    Ok(Json(row.into()))
}

/// Delete a task.
pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let mut conn = state.default_store()?.acquire().await?;
    TaskStore::new(&mut conn).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::arithmetic_side_effects)]

    use super::*;

    #[test]
    fn title_is_required_and_trimmed() {
        assert!(validate_title(None).is_err());
        assert!(validate_title(Some("   ")).is_err());
        assert_eq!(validate_title(Some("  Task 1 ")).ok(), Some("Task 1"));
    }

    #[test]
    fn title_length_is_capped() {
        let long = "x".repeat(MAX_TITLE_LEN + 1);
        assert!(matches!(
            validate_title(Some(&long)),
            Err(ApiError::Validation { field: "title", .. })
        ));
        let max = "x".repeat(MAX_TITLE_LEN);
        assert!(validate_title(Some(&max)).is_ok());
    }
}
