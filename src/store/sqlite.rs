use std::path::Path;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{Map, Value};
use sqlx::{sqlite::SqliteRow, Column, Row as _, SqlitePool, TypeInfo, ValueRef};

use super::{
    ensure_column, ensure_owner, ensure_table, row_str, OrderBy, RemoteStore, Row,
    ERR_OWNER_MISMATCH,
};
use crate::{db, migrate, AppError, AppResult};

/// Reference remote store backed by SQLite through sqlx.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) a database file and bring its schema up to date.
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        let pool = db::open_sqlite_pool(path).await?;
        migrate::apply_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn in_memory() -> anyhow::Result<Self> {
        let pool = db::open_memory_pool().await?;
        migrate::apply_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Wrap a pool whose schema is already in place.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn row_to_value(row: SqliteRow) -> Row {
    let mut map = Map::new();
    for col in row.columns() {
        let idx = col.ordinal();
        let v = row.try_get_raw(idx).ok();
        let val = match v {
            Some(raw) => {
                if raw.is_null() {
                    Value::Null
                } else {
                    match raw.type_info().name() {
                        "INTEGER" => row
                            .try_get::<i64, _>(idx)
                            .map(Value::from)
                            .unwrap_or(Value::Null),
                        "REAL" => row
                            .try_get::<f64, _>(idx)
                            .map(Value::from)
                            .unwrap_or(Value::Null),
                        _ => row
                            .try_get::<String, _>(idx)
                            .map(Value::from)
                            .unwrap_or(Value::Null),
                    }
                }
            }
            None => Value::Null,
        };
        map.insert(col.name().to_string(), val);
    }
    map
}

fn bind_value<'q>(
    q: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    v: &Value,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    match v {
        Value::Null => q.bind(Option::<i64>::None),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                q.bind(i)
            } else if let Some(f) = n.as_f64() {
                q.bind(f)
            } else {
                q.bind(Option::<i64>::None)
            }
        }
        Value::Bool(b) => q.bind(*b as i64),
        Value::String(s) => q.bind(s.clone()),
        // arrays and objects are stored as JSON text
        _ => q.bind(v.to_string()),
    }
}

fn with_op(err: impl Into<AppError>, op: &str, table: &str) -> AppError {
    err.into()
        .with_context("operation", op.to_string())
        .with_context("table", table.to_string())
}

async fn select(
    pool: &SqlitePool,
    table: &str,
    owner_id: &str,
    order: &[OrderBy],
) -> AppResult<Vec<Row>> {
    ensure_table(table)?;
    ensure_owner(owner_id)?;
    let mut sql = format!("SELECT * FROM {table} WHERE owner_id = ?");
    if !order.is_empty() {
        let keys = order
            .iter()
            .map(OrderBy::to_sql)
            .collect::<AppResult<Vec<_>>>()?;
        sql.push_str(" ORDER BY ");
        sql.push_str(&keys.join(", "));
    }
    let rows = sqlx::query(&sql)
        .bind(owner_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::from)?;
    Ok(rows.into_iter().map(row_to_value).collect())
}

async fn upsert(pool: &SqlitePool, table: &str, row: Row) -> AppResult<Row> {
    ensure_table(table)?;
    let id = row_str(&row, "id")?.to_string();
    ensure_owner(row_str(&row, "owner_id")?)?;
    let cols: Vec<String> = row.keys().cloned().collect();
    for c in &cols {
        ensure_column(c)?;
    }
    let placeholders: Vec<&str> = cols.iter().map(|_| "?").collect();
    let updates: Vec<String> = cols
        .iter()
        .filter(|c| c.as_str() != "id" && c.as_str() != "owner_id" && c.as_str() != "created_at")
        .map(|c| format!("{c} = excluded.{c}"))
        .collect();
    // An id already held by another owner is never overwritten.
    let sql = if updates.is_empty() {
        format!(
            "INSERT INTO {table} ({}) VALUES ({}) ON CONFLICT(id) DO NOTHING",
            cols.join(","),
            placeholders.join(",")
        )
    } else {
        format!(
            "INSERT INTO {table} ({}) VALUES ({}) ON CONFLICT(id) DO UPDATE SET {} \
             WHERE {table}.owner_id = excluded.owner_id",
            cols.join(","),
            placeholders.join(","),
            updates.join(",")
        )
    };
    let mut query = sqlx::query(&sql);
    for c in &cols {
        let value = row.get(c).ok_or_else(|| {
            AppError::new("STORE/MISSING_FIELD", "Payload missing value for column")
                .with_context("column", c.clone())
        })?;
        query = bind_value(query, value);
    }
    let done = query
        .execute(pool)
        .await
        .map_err(|err| AppError::from(err).with_context("id", id.as_str()))?;
    if done.rows_affected() == 0 {
        let sql = format!("SELECT owner_id FROM {table} WHERE id = ?");
        let holder: Option<String> = sqlx::query_scalar(&sql)
            .bind(id.as_str())
            .fetch_optional(pool)
            .await
            .map_err(|err| AppError::from(err).with_context("id", id.as_str()))?;
        if holder.as_deref() != row.get("owner_id").and_then(Value::as_str) {
            return Err(AppError::new(ERR_OWNER_MISMATCH, "id owned by another user")
                .with_context("id", id.as_str()));
        }
    }
    Ok(row)
}

async fn update(
    pool: &SqlitePool,
    table: &str,
    owner_id: &str,
    id: &str,
    mut patch: Row,
) -> AppResult<()> {
    ensure_table(table)?;
    ensure_owner(owner_id)?;
    patch.remove("id");
    patch.remove("owner_id");
    patch.remove("created_at");
    if patch.is_empty() {
        return Ok(());
    }
    let cols: Vec<String> = patch.keys().cloned().collect();
    for c in &cols {
        ensure_column(c)?;
    }
    let set_clause: Vec<String> = cols.iter().map(|c| format!("{c} = ?")).collect();
    let sql = format!(
        "UPDATE {table} SET {} WHERE owner_id = ? AND id = ?",
        set_clause.join(",")
    );
    let mut query = sqlx::query(&sql);
    for c in &cols {
        if let Some(value) = patch.get(c) {
            query = bind_value(query, value);
        }
    }
    query
        .bind(owner_id)
        .bind(id)
        .execute(pool)
        .await
        .map_err(AppError::from)?;
    Ok(())
}

async fn delete(pool: &SqlitePool, table: &str, owner_id: &str, id: &str) -> AppResult<()> {
    ensure_table(table)?;
    ensure_owner(owner_id)?;
    let sql = format!("DELETE FROM {table} WHERE owner_id = ? AND id = ?");
    sqlx::query(&sql)
        .bind(owner_id)
        .bind(id)
        .execute(pool)
        .await
        .map_err(AppError::from)?;
    Ok(())
}

impl RemoteStore for SqliteStore {
    fn select<'a>(
        &'a self,
        table: &'a str,
        owner_id: &'a str,
        order: &'a [OrderBy],
    ) -> BoxFuture<'a, AppResult<Vec<Row>>> {
        async move {
            select(&self.pool, table, owner_id, order)
                .await
                .map_err(|err| with_op(err, "select", table).with_context("owner_id", owner_id))
        }
        .boxed()
    }

    fn insert<'a>(&'a self, table: &'a str, row: Row) -> BoxFuture<'a, AppResult<Row>> {
        async move {
            upsert(&self.pool, table, row)
                .await
                .map_err(|err| with_op(err, "insert", table))
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
            update(&self.pool, table, owner_id, id, patch)
                .await
                .map_err(|err| with_op(err, "update", table).with_context("id", id))
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
            delete(&self.pool, table, owner_id, id)
                .await
                .map_err(|err| with_op(err, "delete", table).with_context("id", id))
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

    fn task(id: &str, owner: &str, title: &str, created_at: i64) -> Row {
        row(json!({
            "id": id,
            "owner_id": owner,
            "title": title,
            "description": null,
            "quadrant": "q1",
            "completed": false,
            "due_date": null,
            "role_id": null,
            "created_at": created_at,
            "updated_at": created_at,
        }))
    }

    #[tokio::test]
    async fn crud_round_trip_is_owner_scoped() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert("tasks", task("a", "u1", "first", 1)).await.unwrap();
        store.insert("tasks", task("b", "u1", "second", 2)).await.unwrap();
        store.insert("tasks", task("c", "u2", "other", 3)).await.unwrap();

        let rows = store
            .select("tasks", "u1", &[OrderBy::desc("created_at")])
            .await
            .unwrap();
        let titles: Vec<&str> = rows.iter().map(|r| r["title"].as_str().unwrap()).collect();
        assert_eq!(titles, ["second", "first"]);
        assert_eq!(rows[0]["completed"], json!(0));

        store
            .update("tasks", "u1", "a", row(json!({ "completed": true })))
            .await
            .unwrap();
        store.delete("tasks", "u1", "b").await.unwrap();
        let rows = store.select("tasks", "u1", &[]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["completed"], json!(1));
    }

    #[tokio::test]
    async fn insert_upserts_same_id() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert("tasks", task("a", "u1", "draft", 1)).await.unwrap();
        store.insert("tasks", task("a", "u1", "final", 1)).await.unwrap();
        let rows = store.select("tasks", "u1", &[]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["title"], "final");
    }

    #[tokio::test]
    async fn foreign_owner_cannot_overwrite_or_delete() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert("tasks", task("a", "u1", "mine", 1)).await.unwrap();
        let err = store
            .insert("tasks", task("a", "u2", "theirs", 1))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ERR_OWNER_MISMATCH);
        assert_eq!(err.context().get("id").map(String::as_str), Some("a"));
        assert_eq!(err.context().get("operation").map(String::as_str), Some("insert"));
        store.delete("tasks", "u2", "a").await.unwrap();
        let rows = store.select("tasks", "u1", &[]).await.unwrap();
        assert_eq!(rows[0]["title"], "mine");
        assert!(store.select("tasks", "u2", &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_rows_are_idempotent() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .update("tasks", "u1", "nope", row(json!({ "title": "x" })))
            .await
            .unwrap();
        store.delete("tasks", "u1", "nope").await.unwrap();
    }

    #[tokio::test]
    async fn rejects_injected_column_names() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert("tasks", task("a", "u1", "t", 1)).await.unwrap();
        let err = store
            .update("tasks", "u1", "a", row(json!({ "title = 'x' --": "y" })))
            .await
            .unwrap_err();
        assert_eq!(err.code(), super::super::ERR_INVALID_COLUMN);
        assert_eq!(err.context().get("operation").map(String::as_str), Some("update"));
    }

    #[tokio::test]
    async fn ritual_delete_cascades_completions() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .insert(
                "rituals",
                row(json!({
                    "id": "r1", "owner_id": "u1", "title": "Meditate",
                    "description": null, "days_of_week": [1, 2, 3],
                    "is_active": true, "created_at": 1, "updated_at": 1,
                })),
            )
            .await
            .unwrap();
        store
            .insert(
                "ritual_completions",
                row(json!({
                    "id": "c1", "owner_id": "u1", "ritual_id": "r1",
                    "completed_on": "2024-05-01", "completed": true,
                    "created_at": 1, "updated_at": 1,
                })),
            )
            .await
            .unwrap();
        let rituals = store.select("rituals", "u1", &[]).await.unwrap();
        assert_eq!(rituals[0]["days_of_week"], "[1,2,3]");

        store.delete("rituals", "u1", "r1").await.unwrap();
        let completions = store.select("ritual_completions", "u1", &[]).await.unwrap();
        assert!(completions.is_empty());
    }
}
