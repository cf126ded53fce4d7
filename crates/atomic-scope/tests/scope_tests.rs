//! Integration tests for scope isolation across real `SQLite` stores.
//!
//! Every store is an in-memory database on a pinned connection, so reads
//! after a rollback see exactly what the database kept.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    clippy::indexing_slicing
)]

use std::sync::Arc;

use atomic_db::{ConnectionMode, Store, StoreConfig, StoreId, StoreRegistry, TaskRow, TaskStore};
use atomic_scope::{Phase, ScopeError, ScopeManager};

async fn pinned(alias: &str) -> Arc<Store> {
    let store = Store::connect(&StoreConfig::new(alias, "sqlite::memory:"), ConnectionMode::Pinned)
        .await
        .expect("Failed to open in-memory SQLite");
    {
        let mut conn = store.acquire().await.unwrap();
        TaskStore::new(&mut conn).ensure_schema().await.unwrap();
    }
    Arc::new(store)
}

async fn started_manager(aliases: &[&str]) -> ScopeManager {
    let mut stores = Vec::new();
    for alias in aliases {
        stores.push(pinned(alias).await);
    }
    let enrolled: Vec<String> = aliases.iter().map(|a| (*a).to_owned()).collect();
    let manager = ScopeManager::new(Arc::new(StoreRegistry::new(stores, &enrolled).unwrap()));
    manager.start().await.unwrap();
    manager
}

fn store<'a>(manager: &'a ScopeManager, alias: &str) -> &'a Arc<Store> {
    manager.registry().get(&StoreId::new(alias)).unwrap()
}

async fn create(store: &Store, title: &str) -> TaskRow {
    let mut conn = store.acquire().await.unwrap();
    TaskStore::new(&mut conn).create(title, false).await.unwrap()
}

async fn titles(store: &Store) -> Vec<String> {
    let mut conn = store.acquire().await.unwrap();
    TaskStore::new(&mut conn)
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.title)
        .collect()
}

#[tokio::test]
async fn begin_write_rollback_restores_baseline() {
    let manager = started_manager(&["default"]).await;
    let default = store(&manager, "default");
    create(default, "Task 1").await;

    manager.enter_scope().await.unwrap();
    create(default, "Task 2").await;
    assert_eq!(titles(default).await.len(), 2);

    manager.exit_scope_with_rollback().await.unwrap();
    assert_eq!(titles(default).await, vec!["Task 1"]);
}

#[tokio::test]
async fn updates_and_deletes_are_reverted_too() {
    let manager = started_manager(&["default"]).await;
    let default = store(&manager, "default");
    let baseline = create(default, "Task 1").await;

    manager.enter_scope().await.unwrap();
    {
        let mut conn = default.acquire().await.unwrap();
        let mut tasks = TaskStore::new(&mut conn);
        tasks.update(baseline.id, "Changed", true).await.unwrap();
        tasks.create("Extra", false).await.unwrap();
        tasks.delete(baseline.id).await.unwrap();
    }
    manager.exit_scope_with_rollback().await.unwrap();

    let mut conn = default.acquire().await.unwrap();
    let rows = TaskStore::new(&mut conn).list().await.unwrap();
    assert_eq!(rows, vec![baseline]);
}

#[tokio::test]
async fn rollback_without_scope_fails_and_leaves_data_alone() {
    let manager = started_manager(&["default"]).await;
    let default = store(&manager, "default");
    create(default, "Task 1").await;

    let result = manager.exit_scope_with_rollback().await;
    assert!(matches!(result, Err(ScopeError::NoActiveScope)));
    assert_eq!(titles(default).await, vec!["Task 1"]);
    assert_eq!(manager.phase().await, Phase::ScopeClosed);
}

#[tokio::test]
async fn double_begin_is_rejected_and_keeps_first_scope() {
    let manager = started_manager(&["default"]).await;
    let default = store(&manager, "default");

    manager.enter_scope().await.unwrap();
    create(default, "Inside").await;

    assert!(matches!(
        manager.enter_scope().await,
        Err(ScopeError::ScopeAlreadyOpen)
    ));

    // The original scope is still the one rolled back.
    manager.exit_scope_with_rollback().await.unwrap();
    assert!(titles(default).await.is_empty());
}

#[tokio::test]
async fn sequential_scopes_leave_nothing_behind() {
    let manager = started_manager(&["default"]).await;
    let default = store(&manager, "default");

    manager.enter_scope().await.unwrap();
    create(default, "A").await;
    manager.exit_scope_with_rollback().await.unwrap();

    manager.enter_scope().await.unwrap();
    create(default, "B").await;
    assert_eq!(titles(default).await, vec!["B"]);
    manager.exit_scope_with_rollback().await.unwrap();

    assert!(titles(default).await.is_empty());
}

#[tokio::test]
async fn rollback_order_is_reverse_of_open_order() {
    let manager = started_manager(&["first", "second", "third"]).await;

    let opened = manager.enter_scope().await.unwrap();
    let rolled_back = manager.exit_scope_with_rollback().await.unwrap();

    let aliases = |ids: &[StoreId]| ids.iter().map(|i| i.as_str().to_owned()).collect::<Vec<_>>();
    assert_eq!(aliases(&opened), vec!["first", "second", "third"]);
    assert_eq!(aliases(&rolled_back), vec!["third", "second", "first"]);
}

#[tokio::test]
async fn every_enrolled_store_is_isolated() {
    let manager = started_manager(&["default", "other"]).await;
    let default = store(&manager, "default");
    let other = store(&manager, "other");

    manager.enter_scope().await.unwrap();
    create(default, "in default").await;
    create(other, "in other").await;
    manager.exit_scope_with_rollback().await.unwrap();

    assert!(titles(default).await.is_empty());
    assert!(titles(other).await.is_empty());
}

#[tokio::test]
async fn failing_store_does_not_block_the_others() {
    let manager = started_manager(&["first", "second"]).await;
    let first = store(&manager, "first");
    let second = store(&manager, "second");
    create(first, "kept").await;

    manager.enter_scope().await.unwrap();
    create(first, "discarded").await;

    // `second` is rolled back first and fails; `first` must still be tried.
    second.close().await;
    let result = manager.exit_scope_with_rollback().await;
    assert!(matches!(
        result,
        Err(ScopeError::StoreUnavailable { ref alias, .. }) if alias == "second"
    ));

    assert_eq!(titles(first).await, vec!["kept"]);
    assert!(!manager.is_open().await);
    manager.enter_scope().await.unwrap_err();
}

#[tokio::test]
async fn failed_begin_unwinds_already_opened_stores() {
    let manager = started_manager(&["first", "second"]).await;
    let first = store(&manager, "first");
    store(&manager, "second").close().await;

    let result = manager.enter_scope().await;
    assert!(matches!(
        result,
        Err(ScopeError::StoreUnavailable { ref alias, .. }) if alias == "second"
    ));
    assert!(!manager.is_open().await);

    // `first` is back in autocommit, so this write survives.
    create(first, "after failed begin").await;
    assert_eq!(titles(first).await, vec!["after failed begin"]);
}

#[tokio::test]
async fn concurrent_writes_inside_one_scope_all_roll_back() {
    let manager = Arc::new(started_manager(&["default"]).await);
    let default = Arc::clone(store(&manager, "default"));

    manager.enter_scope().await.unwrap();
    let mut tasks = Vec::new();
    for i in 0..8 {
        let store = Arc::clone(&default);
        tasks.push(tokio::spawn(async move {
            create(&store, &format!("task {i}")).await;
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(titles(&default).await.len(), 8);

    manager.exit_scope_with_rollback().await.unwrap();
    assert!(titles(&default).await.is_empty());
}

#[tokio::test]
async fn concurrent_begins_open_exactly_one_scope() {
    let manager = Arc::new(started_manager(&["default"]).await);

    let a = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.enter_scope().await }
    });
    let b = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.enter_scope().await }
    });

    let results = [a.await.unwrap(), b.await.unwrap()];
    let opened = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(ScopeError::ScopeAlreadyOpen)))
        .count();
    assert_eq!((opened, rejected), (1, 1));
}

#[tokio::test]
async fn mirrors_are_enrolled_in_scopes() {
    let primary = pinned("default").await;
    let mirror = {
        let config = StoreConfig::new("replica", "sqlite::memory:").with_mirror(true);
        Arc::new(Store::connect(&config, ConnectionMode::Pinned).await.unwrap())
    };
    let registry = StoreRegistry::new(
        vec![primary, mirror],
        &["default".to_owned(), "replica".to_owned()],
    )
    .unwrap();
    assert_eq!(registry.list_stores(false).len(), 1);

    let manager = ScopeManager::new(Arc::new(registry));
    manager.start().await.unwrap();
    let opened = manager.enter_scope().await.unwrap();
    assert_eq!(opened.len(), 2);
    manager.exit_scope_with_rollback().await.unwrap();
}
