#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use anyhow::Result;
use quadrant_lib::model::{NewRitual, NewTask, Quadrant, Ritual, Task};
use quadrant_lib::store::{OrderBy, RemoteStore};
use quadrant_lib::{
    LoadSource, LocalCache, MutationStatus, SqliteStore, SyncErrorCode, SyncedCollection,
};
use serde_json::json;
use tempfile::tempdir;
#[path = "util.rs"]
mod util;

#[tokio::test]
async fn collections_round_trip_through_sqlite() -> Result<()> {
    let dir = tempdir()?;
    let db_path = dir.path().join("quadrant.sqlite3");
    let cache = LocalCache::file(dir.path().join("cache"));
    let config = util::fast_config();

    let task_id = {
        let store = Arc::new(SqliteStore::open(&db_path).await?);
        let tasks: SyncedCollection<Task> =
            SyncedCollection::new(store.clone(), cache.clone(), Arc::clone(&config));
        tasks.load("u1").await;
        let task = tasks
            .add(NewTask::new("Call dentist").with_flags(true, true))
            .await?
            .entity
            .expect("task");
        tasks.toggle(&task.id, "completed").await?;

        let rituals: SyncedCollection<Ritual> =
            SyncedCollection::new(store.clone(), cache.clone(), Arc::clone(&config));
        rituals.set_owner("u1");
        rituals
            .add(NewRitual::new("Stretch").on_days(vec![1, 3, 5]))
            .await?;
        store.close().await;
        task.id
    };

    let store = Arc::new(SqliteStore::open(&db_path).await?);
    let tasks: SyncedCollection<Task> =
        SyncedCollection::new(store.clone(), LocalCache::in_memory(), Arc::clone(&config));
    assert_eq!(tasks.load("u1").await.source, LoadSource::Remote);
    let task = tasks.get(&task_id).expect("persisted task");
    assert!(task.completed);
    assert_eq!(task.quadrant, Quadrant::Q1);

    let rituals: SyncedCollection<Ritual> =
        SyncedCollection::new(store.clone(), LocalCache::in_memory(), config);
    rituals.load("u1").await;
    let ritual = &rituals.items()[0];
    assert_eq!(ritual.days_of_week, vec![1, 3, 5]);
    assert!(ritual.is_active);

    assert_eq!(tasks.load("u2").await.count, 0);
    Ok(())
}

#[tokio::test]
async fn select_orders_and_scopes_rows() -> Result<()> {
    let store = SqliteStore::in_memory().await?;
    for (id, owner, created) in [("a", "u1", 1), ("b", "u1", 3), ("c", "u2", 2)] {
        store
            .insert(
                "tasks",
                util::row(json!({
                    "id": id,
                    "owner_id": owner,
                    "title": id,
                    "quadrant": "q2",
                    "completed": false,
                    "created_at": created,
                    "updated_at": created,
                })),
            )
            .await?;
    }
    let rows = store
        .select("tasks", "u1", &[OrderBy::desc("created_at")])
        .await?;
    let ids: Vec<&str> = rows.iter().filter_map(|r| r["id"].as_str()).collect();
    assert_eq!(ids, vec!["b", "a"]);
    assert_eq!(rows[0]["completed"], json!(0));
    Ok(())
}

#[tokio::test]
async fn reused_id_from_another_owner_fails_to_persist() -> Result<()> {
    let store = Arc::new(SqliteStore::in_memory().await?);
    let config = util::fast_config();
    let id = "018f6b1e-7c2a-7d3e-9a4b-0c1d2e3f4a5b";

    let mine: SyncedCollection<Task> =
        SyncedCollection::new(store.clone(), LocalCache::in_memory(), Arc::clone(&config));
    mine.set_owner("u1");
    let mut draft = NewTask::new("mine");
    draft.id = Some(id.into());
    assert!(mine.add(draft).await?.is_persisted());

    let theirs: SyncedCollection<Task> =
        SyncedCollection::new(store.clone(), LocalCache::in_memory(), config);
    theirs.set_owner("u2");
    let mut draft = NewTask::new("theirs");
    draft.id = Some(id.into());
    let outcome = theirs.add(draft).await?;
    assert_eq!(outcome.status, MutationStatus::PersistFailed);
    assert!(outcome.has_warning(SyncErrorCode::PersistFailed));
    assert_eq!(theirs.unsynced().len(), 1);

    assert!(store.select("tasks", "u2", &[]).await?.is_empty());
    let rows = store.select("tasks", "u1", &[]).await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["title"], "mine");
    Ok(())
}
