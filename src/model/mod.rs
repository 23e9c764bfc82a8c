//! Typed records and the schema boundary between rows and entities.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::store::{OrderBy, Row};
use crate::sync_errors::validation_error;
use crate::{AppError, AppResult};

mod big_rock;
mod planning;
mod ritual;
mod task;

pub use big_rock::{BigRock, NewBigRock};
pub use planning::{Goal, MissionItem, NewGoal, NewMissionItem, NewRole, NewWeeklyPlan, Role, WeeklyPlan};
pub use ritual::{NewRitual, NewRitualCompletion, Ritual, RitualCompletion, ALL_DAYS};
pub use task::{group_by_quadrant, NewTask, Task};

/// Fields the collection owns; patches may not change them.
pub const IMMUTABLE_FIELDS: &[&str] = &["id", "owner_id", "created_at"];

/// A record in another table that should go away with its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedRef {
    pub table: &'static str,
    pub id: String,
}

pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const TABLE: &'static str;
    /// Columns the store may hand back as 0/1 integers.
    const BOOL_FIELDS: &'static [&'static str] = &[];
    /// Columns the store may hand back as JSON text.
    const JSON_FIELDS: &'static [&'static str] = &[];

    fn id(&self) -> &str;
    fn owner_id(&self) -> &str;
    fn created_at(&self) -> i64;
    fn updated_at(&self) -> i64;
    fn set_updated_at(&mut self, ms: i64);

    /// Payload checks beyond what deserialisation enforces.
    fn validate(&self) -> AppResult<()>;

    fn default_order() -> Vec<OrderBy> {
        vec![OrderBy::desc("created_at")]
    }

    fn linked(&self) -> Vec<LinkedRef> {
        Vec::new()
    }

    /// Copy derived, non-persisted state across a replacement of `self`.
    fn carry_derived(&mut self, _prev: &Self) {}

    fn from_row(row: Row) -> AppResult<Self> {
        let entity: Self = decode_row(row, Self::TABLE, Self::BOOL_FIELDS, Self::JSON_FIELDS)?;
        if entity.id().trim().is_empty() {
            return Err(validation_error("id", "id is required"));
        }
        if entity.owner_id().trim().is_empty() {
            return Err(validation_error("owner_id", "owner is required"));
        }
        entity.validate()?;
        Ok(entity)
    }

    fn to_row(&self) -> AppResult<Row> {
        match serde_json::to_value(self)? {
            Value::Object(row) => Ok(row),
            _ => Err(AppError::new("MODEL/NOT_AN_OBJECT", "entity did not serialise to an object")
                .with_context("table", Self::TABLE)),
        }
    }
}

fn decode_row<T: DeserializeOwned>(
    mut row: Row,
    table: &str,
    bools: &[&str],
    json: &[&str],
) -> AppResult<T> {
    for field in bools {
        if let Some(value) = row.get_mut(*field) {
            if let Some(n) = value.as_i64() {
                *value = Value::Bool(n != 0);
            }
        }
    }
    for field in json {
        if let Some(value) = row.get_mut(*field) {
            if let Some(text) = value.as_str() {
                let parsed: Value = serde_json::from_str(text).map_err(|err| {
                    validation_error(field, format!("{field} is not valid json: {err}"))
                        .with_context("table", table)
                })?;
                *value = parsed;
            }
        }
    }
    serde_json::from_value(Value::Object(row)).map_err(|err| {
        validation_error("row", format!("malformed {table} row: {err}")).with_context("table", table)
    })
}

pub(crate) fn require_text(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        Err(validation_error(field, format!("{field} is required")))
    } else {
        Ok(())
    }
}

pub(crate) fn optional_text_within(field: &str, value: Option<&str>, max: usize) -> AppResult<()> {
    match value {
        Some(text) if text.chars().count() > max => Err(validation_error(
            field,
            format!("{field} must be at most {max} characters"),
        )),
        _ => Ok(()),
    }
}

/// Covey quadrant of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum Quadrant {
    /// Urgent and important.
    Q1,
    /// Important, not urgent.
    #[default]
    Q2,
    /// Urgent, not important.
    Q3,
    /// Neither.
    Q4,
}

impl Quadrant {
    pub const ALL: [Quadrant; 4] = [Quadrant::Q1, Quadrant::Q2, Quadrant::Q3, Quadrant::Q4];

    pub fn from_flags(urgent: bool, important: bool) -> Self {
        match (urgent, important) {
            (true, true) => Quadrant::Q1,
            (false, true) => Quadrant::Q2,
            (true, false) => Quadrant::Q3,
            (false, false) => Quadrant::Q4,
        }
    }

    pub fn is_urgent(self) -> bool {
        matches!(self, Quadrant::Q1 | Quadrant::Q3)
    }

    pub fn is_important(self) -> bool {
        matches!(self, Quadrant::Q1 | Quadrant::Q2)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Quadrant::Q1 => "q1",
            Quadrant::Q2 => "q2",
            Quadrant::Q3 => "q3",
            Quadrant::Q4 => "q4",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Quadrant::Q1 => "Do first",
            Quadrant::Q2 => "Schedule",
            Quadrant::Q3 => "Delegate",
            Quadrant::Q4 => "Eliminate",
        }
    }
}
