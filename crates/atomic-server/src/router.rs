//! Axum router construction for the atomic server.
//!
//! Assembles the request pipeline and, when the harness is enabled, the
//! `/atomic` control routes into a single [`Router`] with CORS and
//! request tracing enabled.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::atomic;
use crate::handlers;
use crate::state::AppState;

/// Build the complete Axum router.
///
/// The router includes:
/// - `GET /health/` -- liveness check
/// - `GET|POST /tasks/` -- list and create tasks
/// - `GET|PUT|PATCH|DELETE /tasks/{id}/` -- single task
/// - `GET /atomic/{begin,setup,rollback,status}/` -- only with a scope manager
///
/// CORS allows any origin so a browser-driven test suite served from
/// another port can reach the API.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/health/", get(handlers::health))
        .route(
            "/tasks/",
            get(handlers::list_tasks).post(handlers::create_task),
        )
        .route(
            "/tasks/{id}/",
            get(handlers::get_task)
                .put(handlers::update_task)
                .patch(handlers::patch_task)
                .delete(handlers::delete_task),
        );

    if state.scope.is_some() {
        router = router.nest("/atomic", atomic_routes());
    }

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn atomic_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/begin/", get(atomic::begin))
        .route("/setup/", get(atomic::setup))
        .route("/rollback/", get(atomic::rollback))
        .route("/status/", get(atomic::status))
}
