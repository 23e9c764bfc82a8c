use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::{require_text, Entity, LinkedRef, Task};
use crate::store::OrderBy;
use crate::sync_errors::validation_error;
use crate::AppResult;

/// A weekly priority, optionally scheduled as a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct BigRock {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    #[ts(type = "string")]
    pub week_start: NaiveDate,
    #[serde(default)]
    #[ts(optional)]
    pub role_id: Option<String>,
    #[serde(default)]
    #[ts(optional)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub completed: bool,
    #[ts(type = "number")]
    pub created_at: i64,
    #[ts(type = "number")]
    pub updated_at: i64,
}

impl Entity for BigRock {
    const TABLE: &'static str = "big_rocks";
    const BOOL_FIELDS: &'static [&'static str] = &["completed"];

    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> &str {
        &self.owner_id
    }

    fn created_at(&self) -> i64 {
        self.created_at
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn set_updated_at(&mut self, ms: i64) {
        self.updated_at = ms;
    }

    fn validate(&self) -> AppResult<()> {
        require_text("title", &self.title)?;
        if self.priority < 0 {
            return Err(validation_error("priority", "priority cannot be negative"));
        }
        Ok(())
    }

    fn default_order() -> Vec<OrderBy> {
        vec![OrderBy::asc("priority"), OrderBy::desc("created_at")]
    }

    fn linked(&self) -> Vec<LinkedRef> {
        self.task_id
            .iter()
            .filter(|id| !id.trim().is_empty())
            .map(|id| LinkedRef {
                table: Task::TABLE,
                id: id.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewBigRock {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    pub week_start: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub priority: i32,
}

impl NewBigRock {
    pub fn new(title: impl Into<String>, week_start: NaiveDate) -> Self {
        Self {
            id: None,
            title: title.into(),
            week_start,
            role_id: None,
            task_id: None,
            priority: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linked_task_is_reported_for_cascade() {
        let mut rock = BigRock {
            id: "b1".into(),
            owner_id: "u1".into(),
            title: "Ship release".into(),
            week_start: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            role_id: None,
            task_id: None,
            priority: 1,
            completed: false,
            created_at: 0,
            updated_at: 0,
        };
        assert!(rock.linked().is_empty());
        rock.task_id = Some("t1".into());
        assert_eq!(
            rock.linked(),
            vec![LinkedRef {
                table: "tasks",
                id: "t1".into()
            }]
        );
    }
}
