use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

use super::{
    ensure_owner, ensure_table, row_str, OrderBy, RemoteOp, RemoteStore, Row, ERR_OWNER_MISMATCH,
};
use crate::{AppError, AppResult};

pub const ERR_OFFLINE: &str = "STORE/OFFLINE";
pub const ERR_INJECTED: &str = "STORE/INJECTED_FAILURE";

#[derive(Default)]
struct Inner {
    // table -> id -> row
    tables: BTreeMap<String, BTreeMap<String, Row>>,
    offline: bool,
    failures: HashMap<RemoteOp, u32>,
    failing_ids: HashMap<String, RemoteOp>,
    delay: Option<Duration>,
    calls: Vec<(RemoteOp, String)>,
}

/// In-process store with failure injection.
///
/// Used as the remote in tests and demos; behaves like the SQLite store with
/// respect to owner scoping, upserts and idempotent deletes.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every subsequent call fails until switched back on.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// The next `times` calls of `op` fail.
    pub fn fail_next(&self, op: RemoteOp, times: u32) {
        *self.lock().failures.entry(op).or_insert(0) += times;
    }

    /// Calls of `op` that target `id` keep failing.
    pub fn fail_for_id(&self, id: impl Into<String>, op: RemoteOp) {
        self.lock().failing_ids.insert(id.into(), op);
    }

    /// Artificial latency added to every call.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.lock().delay = delay;
    }

    pub fn seed(&self, table: &str, row: Row) -> AppResult<()> {
        ensure_table(table)?;
        let id = row_str(&row, "id")?.to_string();
        self.lock()
            .tables
            .entry(table.to_string())
            .or_default()
            .insert(id, row);
        Ok(())
    }

    /// Snapshot of an owner's rows, unordered.
    pub fn rows(&self, table: &str, owner_id: &str) -> Vec<Row> {
        self.lock()
            .tables
            .get(table)
            .map(|rows| {
                rows.values()
                    .filter(|row| owner_matches(row, owner_id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get(&self, table: &str, id: &str) -> Option<Row> {
        self.lock()
            .tables
            .get(table)
            .and_then(|rows| rows.get(id))
            .cloned()
    }

    pub fn call_count(&self, op: RemoteOp) -> usize {
        self.lock().calls.iter().filter(|(o, _)| *o == op).count()
    }

    fn begin(&self, op: RemoteOp, table: &str, id: Option<&str>) -> AppResult<Option<Duration>> {
        let mut inner = self.lock();
        inner.calls.push((op, table.to_string()));
        if inner.offline {
            return Err(AppError::new(ERR_OFFLINE, "remote store offline")
                .with_context("operation", op.as_str()));
        }
        if let Some(remaining) = inner.failures.get_mut(&op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(AppError::new(ERR_INJECTED, "injected failure")
                    .with_context("operation", op.as_str()));
            }
        }
        if let Some(id) = id {
            if inner.failing_ids.get(id) == Some(&op) {
                return Err(AppError::new(ERR_INJECTED, "injected failure")
                    .with_context("operation", op.as_str())
                    .with_context("id", id));
            }
        }
        Ok(inner.delay)
    }
}

fn owner_matches(row: &Row, owner_id: &str) -> bool {
    row.get("owner_id").and_then(Value::as_str) == Some(owner_id)
}

async fn pause(delay: Option<Duration>) {
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
}

impl RemoteStore for MemoryStore {
    fn select<'a>(
        &'a self,
        table: &'a str,
        owner_id: &'a str,
        order: &'a [OrderBy],
    ) -> BoxFuture<'a, AppResult<Vec<Row>>> {
        async move {
            ensure_table(table)?;
            ensure_owner(owner_id)?;
            let delay = self.begin(RemoteOp::Select, table, None)?;
            pause(delay).await;
            let mut rows = self.rows(table, owner_id);
            rows.sort_by(|a, b| {
                order
                    .iter()
                    .map(|key| key.compare(a, b))
                    .find(|ord| ord.is_ne())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            Ok(rows)
        }
        .boxed()
    }

    fn insert<'a>(&'a self, table: &'a str, row: Row) -> BoxFuture<'a, AppResult<Row>> {
        async move {
            ensure_table(table)?;
            let id = row_str(&row, "id")?.to_string();
            ensure_owner(row_str(&row, "owner_id")?)?;
            let delay = self.begin(RemoteOp::Insert, table, Some(&id))?;
            pause(delay).await;
            let mut inner = self.lock();
            let rows = inner.tables.entry(table.to_string()).or_default();
            if let Some(existing) = rows.get(&id) {
                if !owner_matches(existing, row_str(&row, "owner_id")?) {
                    return Err(AppError::new(ERR_OWNER_MISMATCH, "id owned by another user")
                        .with_context("id", id));
                }
            }
            rows.insert(id, row.clone());
            Ok(row)
        }
        .boxed()
    }

    fn update<'a>(
        &'a self,
        table: &'a str,
        owner_id: &'a str,
        id: &'a str,
        patch: Row,
    ) -> BoxFuture<'a, AppResult<()>> {
        async move {
            ensure_table(table)?;
            ensure_owner(owner_id)?;
            let delay = self.begin(RemoteOp::Update, table, Some(id))?;
            pause(delay).await;
            let mut inner = self.lock();
            if let Some(row) = inner
                .tables
                .get_mut(table)
                .and_then(|rows| rows.get_mut(id))
                .filter(|row| owner_matches(row, owner_id))
            {
                for (key, value) in patch {
                    if key == "id" || key == "owner_id" || key == "created_at" {
                        continue;
                    }
                    row.insert(key, value);
                }
            }
            Ok(())
        }
        .boxed()
    }

    fn delete<'a>(
        &'a self,
        table: &'a str,
        owner_id: &'a str,
        id: &'a str,
    ) -> BoxFuture<'a, AppResult<()>> {
        async move {
            ensure_table(table)?;
            ensure_owner(owner_id)?;
            let delay = self.begin(RemoteOp::Delete, table, Some(id))?;
            pause(delay).await;
            let mut inner = self.lock();
            if let Some(rows) = inner.tables.get_mut(table) {
                if rows.get(id).is_some_and(|row| owner_matches(row, owner_id)) {
                    rows.remove(id);
                }
            }
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn select_is_owner_scoped_and_ordered() {
        let store = MemoryStore::new();
        store
            .seed("tasks", row(json!({ "id": "a", "owner_id": "u1", "created_at": 1 })))
            .unwrap();
        store
            .seed("tasks", row(json!({ "id": "b", "owner_id": "u1", "created_at": 2 })))
            .unwrap();
        store
            .seed("tasks", row(json!({ "id": "c", "owner_id": "u2", "created_at": 3 })))
            .unwrap();

        let rows = store
            .select("tasks", "u1", &[OrderBy::desc("created_at")])
            .await
            .unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, ["b", "a"]);
    }

    #[tokio::test]
    async fn insert_is_an_upsert() {
        let store = MemoryStore::new();
        let first = row(json!({ "id": "a", "owner_id": "u1", "title": "one" }));
        let second = row(json!({ "id": "a", "owner_id": "u1", "title": "two" }));
        store.insert("tasks", first).await.unwrap();
        store.insert("tasks", second).await.unwrap();
        assert_eq!(store.rows("tasks", "u1").len(), 1);
        assert_eq!(store.get("tasks", "a").unwrap()["title"], "two");
    }

    #[tokio::test]
    async fn update_and_delete_respect_owner() {
        let store = MemoryStore::new();
        store
            .seed("tasks", row(json!({ "id": "a", "owner_id": "u1", "title": "one" })))
            .unwrap();
        store
            .update("tasks", "u2", "a", row(json!({ "title": "hijack" })))
            .await
            .unwrap();
        assert_eq!(store.get("tasks", "a").unwrap()["title"], "one");
        store.delete("tasks", "u2", "a").await.unwrap();
        assert!(store.get("tasks", "a").is_some());
        store.delete("tasks", "u1", "a").await.unwrap();
        assert!(store.get("tasks", "a").is_none());
        store.delete("tasks", "u1", "a").await.unwrap();
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let store = MemoryStore::new();
        store.fail_next(RemoteOp::Select, 1);
        let err = store.select("tasks", "u1", &[]).await.unwrap_err();
        assert_eq!(err.code(), ERR_INJECTED);
        assert!(store.select("tasks", "u1", &[]).await.is_ok());
        assert_eq!(store.call_count(RemoteOp::Select), 2);

        store.set_offline(true);
        let err = store.delete("tasks", "u1", "x").await.unwrap_err();
        assert_eq!(err.code(), ERR_OFFLINE);
    }

    #[tokio::test]
    async fn rejects_unscoped_calls() {
        let store = MemoryStore::new();
        assert!(store.select("tasks", "", &[]).await.is_err());
        let missing_owner = row(json!({ "id": "a", "title": "x" }));
        assert!(store.insert("tasks", missing_owner).await.is_err());
    }
}
