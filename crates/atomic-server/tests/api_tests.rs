//! Integration tests for the HTTP pipeline and the atomic control endpoints.
//!
//! Tests use Axum's `Router` directly via `tower::ServiceExt` without
//! starting a TCP server. Harness-enabled states run on a pinned
//! in-memory `SQLite` store, exactly as the binary would with `CI=true`.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    clippy::indexing_slicing
)]

use std::sync::Arc;

use atomic_db::TaskStore;
use atomic_scope::Phase;
use atomic_server::config::{AppConfig, DatabaseConfig};
use atomic_server::handlers::TaskResponse;
use atomic_server::startup;
use atomic_server::{AppState, build_router};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

fn harness_config(begin_on_start: bool) -> AppConfig {
    let mut config = AppConfig::default();
    config.databases = vec![DatabaseConfig {
        alias: "default".to_owned(),
        url: "sqlite::memory:".to_owned(),
        mirror: false,
        max_connections: 1,
    }];
    config.atomic.enabled = true;
    config.atomic.begin_on_start = begin_on_start;
    config
}

/// Harness state with one task created before any scope is opened.
async fn seeded_state(config: &AppConfig) -> Arc<AppState> {
    let state = startup::prepare(config).await.unwrap();
    {
        let mut conn = state.default_store().unwrap().acquire().await.unwrap();
        TaskStore::new(&mut conn).create("Task 1", false).await.unwrap();
    }
    state
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = router
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
    send(router, "GET", uri, None).await
}

async fn task_count(router: &Router) -> usize {
    let (status, body) = get(router, "/tasks/").await;
    assert_eq!(status, StatusCode::OK);
    body.as_array().unwrap().len()
}

// =========================================================================
// Control endpoints
// =========================================================================

#[tokio::test]
async fn begin_create_rollback_restores_fixture() {
    let router = build_router(seeded_state(&harness_config(false)).await);

    let (status, _) = get(&router, "/atomic/begin/").await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&router, "POST", "/tasks/", Some(json!({"title": "Task 2"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(task_count(&router).await, 2);

    let (status, _) = get(&router, "/atomic/rollback/").await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = get(&router, "/tasks/").await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["title"], "Task 1");
}

#[tokio::test]
async fn rollback_without_begin_is_a_server_error() {
    let router = build_router(seeded_state(&harness_config(false)).await);

    let (status, body) = get(&router, "/atomic/rollback/").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], 500);
    assert!(body["error"].as_str().unwrap().contains("not inside an atomic scope"));

    assert_eq!(task_count(&router).await, 1);
}

#[tokio::test]
async fn second_begin_is_rejected() {
    let router = build_router(seeded_state(&harness_config(false)).await);

    assert_eq!(get(&router, "/atomic/begin/").await.0, StatusCode::NO_CONTENT);
    let (status, body) = get(&router, "/atomic/begin/").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("already open"));

    assert_eq!(get(&router, "/atomic/rollback/").await.0, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn two_sequential_scenarios_are_isolated() {
    let router = build_router(seeded_state(&harness_config(false)).await);

    for title in ["Buy groceries", "Complete homework"] {
        assert_eq!(get(&router, "/atomic/begin/").await.0, StatusCode::NO_CONTENT);
        send(&router, "POST", "/tasks/", Some(json!({"title": title}))).await;

        let (_, body) = get(&router, "/tasks/").await;
        let titles: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["title"].as_str().unwrap())
            .collect();
        assert_eq!(titles, vec!["Task 1", title]);

        assert_eq!(get(&router, "/atomic/rollback/").await.0, StatusCode::NO_CONTENT);
    }

    assert_eq!(task_count(&router).await, 1);
}

#[tokio::test]
async fn updates_and_deletes_inside_scope_are_undone() {
    let router = build_router(seeded_state(&harness_config(false)).await);
    let (_, before) = get(&router, "/tasks/").await;
    let id = before[0]["id"].as_i64().unwrap();

    get(&router, "/atomic/begin/").await;
    let (status, _) = send(
        &router,
        "PATCH",
        &format!("/tasks/{id}/"),
        Some(json!({"completed": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&router, "DELETE", &format!("/tasks/{id}/"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(task_count(&router).await, 0);
    get(&router, "/atomic/rollback/").await;

    let (_, after) = get(&router, "/tasks/").await;
    assert_eq!(after, before);
}

#[tokio::test]
async fn setup_without_fixtures_is_ok() {
    let router = build_router(seeded_state(&harness_config(false)).await);
    let (status, _) = get(&router, "/atomic/setup/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(task_count(&router).await, 1);
}

#[tokio::test]
async fn setup_fixtures_live_inside_the_scope() {
    let dir = tempfile::tempdir().unwrap();
    let fixtures = dir.path().join("tasks.sql");
    std::fs::write(
        &fixtures,
        "INSERT INTO tasks (title, completed) VALUES ('Fixture A', 0);\n\
         INSERT INTO tasks (title, completed) VALUES ('Fixture B', 1);\n",
    )
    .unwrap();

    let mut config = harness_config(false);
    config.atomic.fixtures = Some(fixtures);
    let router = build_router(seeded_state(&config).await);

    get(&router, "/atomic/begin/").await;
    assert_eq!(get(&router, "/atomic/setup/").await.0, StatusCode::OK);
    assert_eq!(task_count(&router).await, 3);
    get(&router, "/atomic/rollback/").await;

    assert_eq!(task_count(&router).await, 1);
}

#[tokio::test]
async fn missing_fixture_file_is_a_server_error() {
    let mut config = harness_config(false);
    config.atomic.fixtures = Some("does/not/exist.sql".into());
    let router = build_router(seeded_state(&config).await);

    let (status, body) = get(&router, "/atomic/setup/").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().starts_with("fixture error"));
}

#[tokio::test]
async fn begin_on_start_opens_the_first_scope() {
    let state = startup::prepare(&harness_config(true)).await.unwrap();
    let router = build_router(Arc::clone(&state));

    let (status, body) = get(&router, "/atomic/status/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phase"], "scope_open");
    assert_eq!(body["stores"], json!(["default"]));

    // Startup scope must be rolled back before the driver's first begin.
    assert_eq!(
        get(&router, "/atomic/begin/").await.0,
        StatusCode::INTERNAL_SERVER_ERROR
    );
    assert_eq!(get(&router, "/atomic/rollback/").await.0, StatusCode::NO_CONTENT);
    assert_eq!(get(&router, "/atomic/begin/").await.0, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn teardown_rolls_back_and_terminates() {
    let state = seeded_state(&harness_config(false)).await;
    let router = build_router(Arc::clone(&state));

    get(&router, "/atomic/begin/").await;
    send(&router, "POST", "/tasks/", Some(json!({"title": "Unsaved"}))).await;

    startup::teardown(&state).await;

    let manager = state.scope_manager().unwrap();
    assert_eq!(manager.phase().await, Phase::Terminated);
    assert!(state.default_store().unwrap().is_closed().await);

    let (status, _) = get(&router, "/atomic/begin/").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

// =========================================================================
// Request pipeline
// =========================================================================

#[tokio::test]
async fn health_check() {
    let router = build_router(seeded_state(&harness_config(false)).await);
    assert_eq!(get(&router, "/health/").await.0, StatusCode::OK);
}

#[tokio::test]
async fn task_crud() {
    let router = build_router(seeded_state(&harness_config(false)).await);

    let (status, created) = send(
        &router,
        "POST",
        "/tasks/",
        Some(json!({"title": "New Task 3", "completed": false})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let created: TaskResponse = serde_json::from_value(created).unwrap();
    assert_eq!(created.title, "New Task 3");
    assert!(!created.completed);

    let uri = format!("/tasks/{}/", created.id);
    let (status, fetched) = get(&router, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["title"], "New Task 3");

    let (status, updated) = send(
        &router,
        "PUT",
        &uri,
        Some(json!({"title": "Updated Task", "completed": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["title"], "Updated Task");
    assert_eq!(updated["completed"], true);

    let (status, patched) = send(&router, "PATCH", &uri, Some(json!({"completed": false}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched["title"], "Updated Task");
    assert_eq!(patched["completed"], false);

    assert_eq!(send(&router, "DELETE", &uri, None).await.0, StatusCode::NO_CONTENT);
    assert_eq!(get(&router, &uri).await.0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_without_title_is_rejected() {
    let router = build_router(seeded_state(&harness_config(false)).await);

    let (status, body) = send(&router, "POST", "/tasks/", Some(json!({"completed": false}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("title").is_some());
    assert_eq!(task_count(&router).await, 1);
}

#[tokio::test]
async fn unknown_task_is_not_found() {
    let router = build_router(seeded_state(&harness_config(false)).await);
    let (status, body) = get(&router, "/tasks/999/").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
}

// =========================================================================
// Harness disabled
// =========================================================================

#[tokio::test]
async fn disabled_harness_has_no_control_routes_and_autocommits() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("app.db").display());
    let mut config = AppConfig::default();
    config.databases[0].url = url;
    assert!(!config.atomic.enabled);

    let state = startup::prepare(&config).await.unwrap();
    assert!(state.scope.is_none());
    let router = build_router(Arc::clone(&state));

    assert_eq!(get(&router, "/atomic/begin/").await.0, StatusCode::NOT_FOUND);
    assert_eq!(get(&router, "/atomic/rollback/").await.0, StatusCode::NOT_FOUND);

    send(&router, "POST", "/tasks/", Some(json!({"title": "Kept"}))).await;
    assert_eq!(task_count(&router).await, 1);

    startup::teardown(&state).await;
    assert!(state.default_store().unwrap().is_closed().await);
}
