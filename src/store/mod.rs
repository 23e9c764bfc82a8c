//! Remote record store interface.
//!
//! Every call carries the owner id; there is no way to express an unscoped
//! query through this trait.

use std::cmp::Ordering;
use std::fmt;

use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::{AppError, AppResult};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// A record as it crosses the store boundary.
pub type Row = Map<String, Value>;

pub const ERR_INVALID_TABLE: &str = "STORE/INVALID_TABLE";
pub const ERR_INVALID_COLUMN: &str = "STORE/INVALID_COLUMN";
pub const ERR_INVALID_ROW: &str = "STORE/INVALID_ROW";
pub const ERR_OWNER_REQUIRED: &str = "STORE/OWNER_REQUIRED";
pub const ERR_OWNER_MISMATCH: &str = "STORE/OWNER_MISMATCH";
pub const ERR_TIMEOUT: &str = "STORE/TIMEOUT";

pub const DOMAIN_TABLES: &[&str] = &[
    "tasks",
    "roles",
    "goals",
    "rituals",
    "ritual_completions",
    "big_rocks",
    "weekly_plans",
    "mission_items",
];

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_]{0,62}$").expect("identifier pattern to compile"));

pub fn ensure_table(table: &str) -> AppResult<()> {
    if DOMAIN_TABLES.contains(&table) {
        Ok(())
    } else {
        Err(AppError::new(ERR_INVALID_TABLE, "invalid table").with_context("table", table))
    }
}

pub fn ensure_column(column: &str) -> AppResult<()> {
    if IDENTIFIER.is_match(column) {
        Ok(())
    } else {
        Err(AppError::new(ERR_INVALID_COLUMN, "invalid column name").with_context("column", column))
    }
}

pub fn ensure_owner(owner_id: &str) -> AppResult<()> {
    if owner_id.trim().is_empty() {
        Err(AppError::new(ERR_OWNER_REQUIRED, "owner id is required"))
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
    pub column: &'static str,
    pub direction: Direction,
}

impl OrderBy {
    pub const fn asc(column: &'static str) -> Self {
        Self {
            column,
            direction: Direction::Asc,
        }
    }

    pub const fn desc(column: &'static str) -> Self {
        Self {
            column,
            direction: Direction::Desc,
        }
    }

    pub fn to_sql(&self) -> AppResult<String> {
        ensure_column(self.column)?;
        let dir = match self.direction {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        };
        Ok(format!("{} {dir}", self.column))
    }

    /// Compare two rows on this key; nulls sort first ascending.
    pub fn compare(&self, a: &Row, b: &Row) -> Ordering {
        let ord = compare_values(a.get(self.column), b.get(self.column));
        match self.direction {
            Direction::Asc => ord,
            Direction::Desc => ord.reverse(),
        }
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(_) => 4,
        }
    }
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    Select,
    Insert,
    Update,
    Delete,
}

impl RemoteOp {
    pub fn as_str(self) -> &'static str {
        match self {
            RemoteOp::Select => "select",
            RemoteOp::Insert => "insert",
            RemoteOp::Update => "update",
            RemoteOp::Delete => "delete",
        }
    }
}

impl fmt::Display for RemoteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Networked record store holding the source of truth across sessions.
///
/// `insert` must be idempotent on `id` so a failed add can be re-sent with
/// the same client id. `update` and `delete` of a missing row succeed.
pub trait RemoteStore: Send + Sync {
    fn select<'a>(
        &'a self,
        table: &'a str,
        owner_id: &'a str,
        order: &'a [OrderBy],
    ) -> BoxFuture<'a, AppResult<Vec<Row>>>;

    fn insert<'a>(&'a self, table: &'a str, row: Row) -> BoxFuture<'a, AppResult<Row>>;

    fn update<'a>(
        &'a self,
        table: &'a str,
        owner_id: &'a str,
        id: &'a str,
        patch: Row,
    ) -> BoxFuture<'a, AppResult<()>>;

    fn delete<'a>(
        &'a self,
        table: &'a str,
        owner_id: &'a str,
        id: &'a str,
    ) -> BoxFuture<'a, AppResult<()>>;
}

/// Pull a required string field out of a row.
pub fn row_str<'r>(row: &'r Row, key: &str) -> AppResult<&'r str> {
    row.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| {
            AppError::new(ERR_INVALID_ROW, "row is missing a required field")
                .with_context("field", key)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn rejects_unknown_tables_and_unsafe_columns() {
        assert!(ensure_table("tasks").is_ok());
        assert_eq!(
            ensure_table("users").unwrap_err().code(),
            ERR_INVALID_TABLE
        );
        assert!(ensure_column("created_at").is_ok());
        assert!(ensure_column("title; DROP TABLE tasks").is_err());
        assert!(ensure_column("Title").is_err());
    }

    #[test]
    fn order_by_renders_sql() {
        assert_eq!(OrderBy::desc("created_at").to_sql().unwrap(), "created_at DESC");
        assert_eq!(OrderBy::asc("priority").to_sql().unwrap(), "priority ASC");
    }

    #[test]
    fn order_by_compares_rows() {
        let a = row(json!({ "priority": 1, "title": "b" }));
        let b = row(json!({ "priority": 2, "title": "a" }));
        assert_eq!(OrderBy::asc("priority").compare(&a, &b), Ordering::Less);
        assert_eq!(OrderBy::desc("priority").compare(&a, &b), Ordering::Greater);
        assert_eq!(OrderBy::asc("title").compare(&a, &b), Ordering::Greater);
        let missing = row(json!({}));
        assert_eq!(OrderBy::asc("priority").compare(&missing, &a), Ordering::Less);
    }

    #[test]
    fn row_str_requires_non_empty() {
        let r = row(json!({ "id": "t1", "owner_id": "  " }));
        assert_eq!(row_str(&r, "id").unwrap(), "t1");
        assert!(row_str(&r, "owner_id").is_err());
        assert!(row_str(&r, "title").is_err());
    }
}
