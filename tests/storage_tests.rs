mod common;

use common::{Task, durable, ephemeral};
use memostore::{Affinity, EntityMapper, Predicate, SortDescriptor, Storage, StoreHandle};
use tempfile::tempdir;

async fn task_scenario(handle: &StoreHandle) {
    let tasks: Storage<Task> = Storage::new(handle);

    let saved = tasks.save(Task::new("1", "A")).await.unwrap();
    assert_eq!(tasks.find_by_id("1").unwrap(), Some(saved.clone()));

    tasks.soft_delete(saved.clone()).await.unwrap();
    assert!(tasks.find_all(None, None).unwrap().is_empty());
    assert_eq!(tasks.find_first(Some(Predicate::eq("id", "1"))).unwrap(), None);

    tasks.delete(saved).await.unwrap();
    assert_eq!(tasks.find_record_by_id("1").unwrap(), None);
    assert_eq!(tasks.find_by_id("1").unwrap(), None);
}

#[tokio::test]
async fn task_scenario_on_ephemeral_store() {
    let (handle, sink) = ephemeral();
    task_scenario(&handle).await;
    assert!(sink.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn task_scenario_on_durable_store() {
    let dir = tempdir().unwrap();
    let (handle, sink) = durable(dir.path());
    task_scenario(&handle).await;
    assert!(sink.is_empty());
}

#[tokio::test]
async fn save_marks_record_unsynced_and_live() {
    let (handle, _) = ephemeral();
    let tasks: Storage<Task> = Storage::new(&handle);

    let task = Task::new("1", "Buy milk").with_priority(2);
    tasks.save(task.clone()).await.unwrap();

    assert_eq!(tasks.find_by_id("1").unwrap(), Some(task));
    let record = tasks.find_record_by_id("1").unwrap().unwrap();
    assert!(!record.synced);
    assert!(!record.soft_deleted);
    assert_eq!(record.fields["title"], "Buy milk");
    assert!(!record.fields.contains_key("id"));
}

#[tokio::test]
async fn save_is_an_upsert() {
    let (handle, _) = ephemeral();
    let tasks: Storage<Task> = Storage::new(&handle);

    tasks.save(Task::new("1", "A")).await.unwrap();
    let first = tasks.find_record_by_id("1").unwrap().unwrap();
    tasks.save(Task::new("1", "B")).await.unwrap();
    let second = tasks.find_record_by_id("1").unwrap().unwrap();

    assert_eq!(tasks.count(None).unwrap(), 1);
    assert_eq!(second.fields["title"], "B");
    assert_eq!(second.object_id, first.object_id);
    assert!(second.date_updated > first.date_updated);
    assert!(second.version > first.version);
}

#[tokio::test]
async fn soft_delete_keeps_the_record_for_reconciliation() {
    let (handle, _) = ephemeral();
    let tasks: Storage<Task> = Storage::new(&handle);

    let task = tasks.save(Task::new("1", "A")).await.unwrap();
    let before = tasks.find_record_by_id("1").unwrap().unwrap();
    tasks.soft_delete(task).await.unwrap();

    assert!(tasks.find_all(None, None).unwrap().is_empty());
    assert_eq!(tasks.count(None).unwrap(), 0);

    let record = tasks.find_record_by_id("1").unwrap().unwrap();
    assert!(record.soft_deleted);
    assert!(!record.synced);
    assert!(record.date_updated > before.date_updated);

    // find_by_id is not filtered
    assert!(tasks.find_by_id("1").unwrap().unwrap().soft_deleted);
}

#[tokio::test]
async fn saving_a_soft_deleted_task_revives_it() {
    let (handle, _) = ephemeral();
    let tasks: Storage<Task> = Storage::new(&handle);

    let task = tasks.save(Task::new("1", "A")).await.unwrap();
    tasks.soft_delete(task.clone()).await.unwrap();
    tasks.save(task).await.unwrap();
    assert_eq!(tasks.find_all(None, None).unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_entities_are_ignored_by_deletes() {
    let (handle, sink) = ephemeral();
    let tasks: Storage<Task> = Storage::new(&handle);

    let ghost = Task::new("404", "ghost");
    assert_eq!(tasks.soft_delete(ghost.clone()).await.unwrap(), ghost);
    assert_eq!(tasks.delete(ghost).await.unwrap().id, "404");
    assert!(tasks.find_record_by_id("404").unwrap().is_none());
    assert!(sink.is_empty());
}

#[tokio::test]
async fn delete_all_is_idempotent() {
    let (handle, _) = ephemeral();
    let tasks: Storage<Task> = Storage::new(&handle);

    let saved = tasks
        .save_many(vec![Task::new("1", "A"), Task::new("2", "B"), Task::new("3", "C")])
        .await
        .unwrap();
    tasks.soft_delete(saved[0].clone()).await.unwrap();

    assert_eq!(tasks.delete_all().await.unwrap(), 3);
    assert!(tasks.find_all(None, None).unwrap().is_empty());
    assert!(tasks.find_record_by_id("1").unwrap().is_none());

    assert_eq!(tasks.delete_all().await.unwrap(), 0);
    assert!(tasks.find_all(None, None).unwrap().is_empty());
}

#[tokio::test]
async fn batch_operations() {
    let (handle, _) = ephemeral();
    let tasks: Storage<Task> = Storage::new(&handle);

    let saved = tasks
        .save_many((1..=4).map(|i| Task::new(&i.to_string(), "t")).collect())
        .await
        .unwrap();
    tasks.soft_delete_many(saved[..2].to_vec()).await.unwrap();
    assert_eq!(tasks.count(None).unwrap(), 2);

    tasks.delete_many(saved[1..3].to_vec()).await.unwrap();
    let remaining: Vec<String> = tasks
        .find_all(None, Some(vec![SortDescriptor::ascending("id")]))
        .unwrap()
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(remaining, vec!["4"]);
    assert!(tasks.find_record_by_id("1").unwrap().unwrap().soft_deleted);
}

#[tokio::test]
async fn queries_filter_and_sort() {
    let (handle, _) = ephemeral();
    let tasks: Storage<Task> = Storage::new(&handle);

    tasks
        .save_many(vec![
            Task::new("1", "Buy milk").with_priority(1),
            Task::new("2", "Buy bread").with_priority(3),
            Task::new("3", "Walk dog").with_priority(2),
        ])
        .await
        .unwrap();

    let buys = tasks
        .find_all(
            Some(Predicate::like("title", "Buy%")),
            Some(vec![SortDescriptor::descending("priority")]),
        )
        .unwrap();
    let ids: Vec<&str> = buys.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["2", "1"]);

    let urgent = tasks.find_first(Some(Predicate::ge("priority", 2))).unwrap().unwrap();
    assert!(urgent.priority >= 2);
    assert_eq!(tasks.count(Some(Predicate::lt("priority", 3))).unwrap(), 2);
}

#[tokio::test]
async fn default_sort_is_newest_first() {
    let (handle, _) = ephemeral();
    let tasks: Storage<Task> = Storage::new(&handle);

    for id in ["a", "b", "c"] {
        tasks.save(Task::new(id, id)).await.unwrap();
    }
    tasks.save(Task::new("a", "touched")).await.unwrap();

    let ids: Vec<String> = tasks
        .find_all(None, None)
        .unwrap()
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(ids, vec!["a", "c", "b"]);
    assert_eq!(tasks.find_first(None).unwrap().unwrap().id, "a");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn background_affinity_reads_committed_state() {
    let dir = tempdir().unwrap();
    let (handle, _) = durable(dir.path());
    let tasks: Storage<Task> = Storage::new(&handle);
    let background = tasks.on(Affinity::Background);
    assert_eq!(background.affinity(), Affinity::Background);

    tasks.save(Task::new("1", "A")).await.unwrap();
    assert_eq!(background.find_by_id("1").unwrap(), tasks.find_by_id("1").unwrap());

    let title = background
        .execute(|mapper, scope| {
            let record = mapper.find_by_id("1", scope)?.unwrap();
            memostore::Result::Ok(record.fields["title"].clone())
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(title, "A");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn durable_store_survives_restart() {
    let dir = tempdir().unwrap();
    {
        let (handle, _) = durable(dir.path());
        let tasks: Storage<Task> = Storage::new(&handle);
        tasks.save(Task::new("1", "A")).await.unwrap();
        let gone = tasks.save(Task::new("2", "B")).await.unwrap();
        tasks.soft_delete(gone).await.unwrap();
        handle.close().await.unwrap();
    }

    let (handle, sink) = durable(dir.path());
    let tasks: Storage<Task> = Storage::new(&handle);
    assert!(sink.is_empty());
    assert_eq!(tasks.find_all(None, None).unwrap(), vec![Task::new("1", "A")]);
    assert!(tasks.find_record_by_id("2").unwrap().unwrap().soft_deleted);
}

#[tokio::test]
async fn mutation_errors_discard_staged_changes() {
    let (handle, _) = ephemeral();
    let tasks: Storage<Task> = Storage::new(&handle);

    let result: memostore::Result<()> = tasks
        .execute_mutate_and_persist(|mapper, scope| {
            mapper.save_domain(&Task::new("1", "A"), scope)?;
            Err(memostore::StoreError::Mapping("rejected".into()))
        })
        .await;
    assert!(result.is_err());
    assert!(!handle.provider().main_context().has_changes());

    tasks.save(Task::new("2", "B")).await.unwrap();
    assert!(tasks.find_record_by_id("1").unwrap().is_none());
}
