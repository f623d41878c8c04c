mod common;

use common::{Task, open};
use memostore::{
    CommitFailurePolicy, MemoryErrorSink, MigrationPlan, Storage, StoreConfig, StoreError,
    StoreHandle,
};
use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

/// Replace the snapshot file with a non-empty directory so the next
/// atomic rename fails.
fn block_snapshot_writes(config: &StoreConfig) {
    let path = config.snapshot_path().unwrap();
    if path.exists() {
        fs::remove_file(&path).unwrap();
    }
    fs::create_dir_all(path.join("occupied")).unwrap();
}

fn unblock_snapshot_writes(config: &StoreConfig) {
    fs::remove_dir_all(config.snapshot_path().unwrap()).unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn commit_failure_is_reported_but_resolves() {
    let dir = tempdir().unwrap();
    let config = StoreConfig::durable("tasks", dir.path());
    let (handle, sink) = open(config.clone());
    let tasks: Storage<Task> = Storage::new(&handle);

    tasks.save(Task::new("1", "A")).await.unwrap();
    block_snapshot_writes(&config);

    let returned = tasks.save(Task::new("2", "B")).await.unwrap();
    assert_eq!(returned, Task::new("2", "B"));
    assert_eq!(sink.len(), 1);
    assert!(matches!(sink.errors()[0], StoreError::Commit(_)));

    // nothing half-applied
    assert!(tasks.find_by_id("2").unwrap().is_none());
    assert_eq!(tasks.count(None).unwrap(), 1);

    // fire-once: the failed write is not retried by the next one
    unblock_snapshot_writes(&config);
    tasks.save(Task::new("3", "C")).await.unwrap();
    assert!(tasks.find_by_id("2").unwrap().is_none());
    assert_eq!(tasks.count(None).unwrap(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn commit_failure_can_be_surfaced() {
    let dir = tempdir().unwrap();
    let config =
        StoreConfig::durable("tasks", dir.path()).commit_failure(CommitFailurePolicy::Surface);
    let (handle, sink) = open(config.clone());
    let tasks: Storage<Task> = Storage::new(&handle);

    block_snapshot_writes(&config);
    let result = tasks.save(Task::new("1", "A")).await;
    assert!(matches!(result, Err(StoreError::Commit(_))));
    assert_eq!(sink.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreadable_store_opens_read_only_and_recovers() {
    let dir = tempdir().unwrap();
    let config = StoreConfig::durable("tasks", dir.path());
    fs::write(config.snapshot_path().unwrap(), b"{ definitely not a snapshot").unwrap();

    let (handle, sink) = open(config.clone());
    assert!(matches!(handle.open_error(), Some(StoreError::StoreOpen(_))));
    assert_eq!(sink.len(), 1);

    let tasks: Storage<Task> = Storage::new(&handle);
    assert!(tasks.find_all(None, None).unwrap().is_empty());
    tasks.save(Task::new("1", "A")).await.unwrap();
    assert!(tasks.find_by_id("1").unwrap().is_none());
    assert_eq!(sink.len(), 2);

    fs::remove_file(config.snapshot_path().unwrap()).unwrap();
    handle.reopen().unwrap();
    assert!(handle.open_error().is_none());
    tasks.save(Task::new("1", "A")).await.unwrap();
    assert_eq!(tasks.find_by_id("1").unwrap(), Some(Task::new("1", "A")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn closed_store_rejects_writes_but_serves_reads() {
    let dir = tempdir().unwrap();
    let (handle, _) = open(StoreConfig::durable("tasks", dir.path()));
    let tasks: Storage<Task> = Storage::new(&handle);
    tasks.save(Task::new("1", "A")).await.unwrap();

    handle.close().await.unwrap();
    assert_eq!(
        tasks.save(Task::new("2", "B")).await,
        Err(StoreError::QueueClosed)
    );
    assert_eq!(tasks.count(None).unwrap(), 1);
}

fn write_v1_store(dir: &Path) {
    let snapshot = json!({
        "format_version": 1,
        "schema_version": 1,
        "name": "tasks",
        "created_at": "2024-01-01T00:00:00Z",
        "entities": {
            "task": {
                "1": {
                    "object_id": "67e55044-10b1-426f-9247-bb680e5fe0c8",
                    "entity": "task",
                    "id": "1",
                    "version": 1,
                    "fields": { "name": "Legacy" },
                    "synced": true,
                    "soft_deleted": false,
                    "date_updated": "2024-01-01T00:00:00Z"
                }
            }
        }
    });
    fs::write(dir.join("tasks.store.json"), snapshot.to_string()).unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn migrations_upgrade_the_store_before_load() {
    let dir = tempdir().unwrap();
    write_v1_store(dir.path());

    let plan = MigrationPlan::new(2)
        .with_step(1, 2, |doc| {
            let tasks = doc["entities"]["task"]
                .as_object_mut()
                .ok_or_else(|| StoreError::Migration("no task table".into()))?;
            for record in tasks.values_mut() {
                let fields = record["fields"].as_object_mut().unwrap();
                if let Some(name) = fields.remove("name") {
                    fields.insert("title".to_string(), name);
                }
            }
            Ok(())
        })
        .unwrap();

    let sink = Arc::new(MemoryErrorSink::new());
    let handle = StoreHandle::builder(StoreConfig::durable("tasks", dir.path()))
        .migrator(Arc::new(plan))
        .error_sink(sink.clone())
        .open()
        .unwrap();
    assert!(sink.is_empty());
    assert_eq!(handle.provider().store().schema_version().unwrap(), 2);

    let tasks: Storage<Task> = Storage::new(&handle);
    assert_eq!(tasks.find_by_id("1").unwrap(), Some(Task::new("1", "Legacy")));
    // migration is not a local edit
    assert!(tasks.find_record_by_id("1").unwrap().unwrap().synced);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_migration_leaves_store_closed_for_writes() {
    let dir = tempdir().unwrap();
    write_v1_store(dir.path());

    let plan = MigrationPlan::new(2)
        .with_step(1, 2, |_| Err(StoreError::Migration("unsupported layout".into())))
        .unwrap();
    let sink = Arc::new(MemoryErrorSink::new());
    let handle = StoreHandle::builder(StoreConfig::durable("tasks", dir.path()))
        .migrator(Arc::new(plan))
        .error_sink(sink.clone())
        .open()
        .unwrap();

    assert!(matches!(handle.open_error(), Some(StoreError::Migration(_))));
    let tasks: Storage<Task> = Storage::new(&handle);
    assert!(tasks.find_by_id("1").unwrap().is_none());
}
