use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::{optional_text_within, require_text, Entity, Quadrant};
use crate::AppResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Task {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    #[serde(default)]
    #[ts(optional)]
    pub description: Option<String>,
    #[serde(default)]
    pub quadrant: Quadrant,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    #[ts(optional, type = "string")]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    #[ts(optional)]
    pub role_id: Option<String>,
    #[ts(type = "number")]
    pub created_at: i64,
    #[ts(type = "number")]
    pub updated_at: i64,
}

impl Task {
    pub fn quadrant(&self) -> Quadrant {
        self.quadrant
    }
}

impl Entity for Task {
    const TABLE: &'static str = "tasks";
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
        optional_text_within("title", Some(&self.title), 500)?;
        optional_text_within("description", self.description.as_deref(), 10_000)
    }
}

/// Payload for creating a task; unset fields take the entity defaults.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NewTask {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quadrant: Option<Quadrant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_id: Option<String>,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_flags(mut self, urgent: bool, important: bool) -> Self {
        self.quadrant = Some(Quadrant::from_flags(urgent, important));
        self
    }
}

/// Bucket open tasks by quadrant, keeping collection order within each bucket.
pub fn group_by_quadrant(tasks: &[Task]) -> BTreeMap<Quadrant, Vec<Task>> {
    let mut grouped: BTreeMap<Quadrant, Vec<Task>> =
        Quadrant::ALL.into_iter().map(|q| (q, Vec::new())).collect();
    for task in tasks.iter().filter(|t| !t.completed) {
        grouped.entry(task.quadrant).or_default().push(task.clone());
    }
    grouped
}
