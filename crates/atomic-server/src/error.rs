//! Error types for the HTTP layer.
//!
//! [`ApiError`] unifies all failure modes into a single enum that can be
//! converted into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation. Scope
//! errors always map to a 500 so the test driver sees harness misuse.

use atomic_db::StoreError;
use atomic_scope::ScopeError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Errors that can occur while handling a request.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A request field failed validation.
    #[error("invalid {field}: {message}")]
    Validation {
        /// Name of the offending field.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A data layer operation failed.
    #[error(transparent)]
    Store(StoreError),

    /// A scope control operation failed.
    #[error(transparent)]
    Scope(#[from] ScopeError),

    /// The fixture script could not be loaded or run.
    #[error("fixture error: {0}")]
    Fixture(String),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => Self::NotFound(what),
            other => Self::Store(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Store(_) | Self::Scope(_) | Self::Fixture(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let mut body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });
        if let (Self::Validation { field, message }, Some(fields)) = (&self, body.as_object_mut()) {
            fields.insert((*field).to_owned(), serde_json::json!([message]));
        }

        (status, axum::Json(body)).into_response()
    }
}
