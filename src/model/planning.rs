use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::{optional_text_within, require_text, Entity};
use crate::store::OrderBy;
use crate::sync_errors::validation_error;
use crate::AppResult;

static COLOR_HEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("color pattern to compile"));

macro_rules! entity_accessors {
    () => {
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
    };
}

/// A life role (parent, engineer, ...) that goals and rocks hang off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Role {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    #[serde(default)]
    #[ts(optional)]
    pub description: Option<String>,
    #[serde(default)]
    #[ts(optional)]
    pub color: Option<String>,
    #[serde(default)]
    pub position: i32,
    #[ts(type = "number")]
    pub created_at: i64,
    #[ts(type = "number")]
    pub updated_at: i64,
}

impl Entity for Role {
    const TABLE: &'static str = "roles";

    entity_accessors!();

    fn validate(&self) -> AppResult<()> {
        require_text("name", &self.name)?;
        match self.color.as_deref() {
            Some(color) if !COLOR_HEX.is_match(color) => Err(validation_error(
                "color",
                "color must be a #RRGGBB hex value",
            )),
            _ => Ok(()),
        }
    }

    fn default_order() -> Vec<OrderBy> {
        vec![OrderBy::asc("position"), OrderBy::asc("created_at")]
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NewRole {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub position: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Goal {
    pub id: String,
    pub owner_id: String,
    #[serde(default)]
    #[ts(optional)]
    pub role_id: Option<String>,
    pub title: String,
    #[serde(default)]
    #[ts(optional)]
    pub description: Option<String>,
    #[serde(default)]
    #[ts(optional, type = "string")]
    pub target_date: Option<NaiveDate>,
    #[serde(default)]
    pub completed: bool,
    #[ts(type = "number")]
    pub created_at: i64,
    #[ts(type = "number")]
    pub updated_at: i64,
}

impl Entity for Goal {
    const TABLE: &'static str = "goals";
    const BOOL_FIELDS: &'static [&'static str] = &["completed"];

    entity_accessors!();

    fn validate(&self) -> AppResult<()> {
        require_text("title", &self.title)?;
        optional_text_within("description", self.description.as_deref(), 10_000)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NewGoal {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_date: Option<NaiveDate>,
}

/// Focus and reflection notes for one week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct WeeklyPlan {
    pub id: String,
    pub owner_id: String,
    #[ts(type = "string")]
    pub week_start: NaiveDate,
    #[serde(default)]
    #[ts(optional)]
    pub focus: Option<String>,
    #[serde(default)]
    #[ts(optional)]
    pub reflection: Option<String>,
    #[ts(type = "number")]
    pub created_at: i64,
    #[ts(type = "number")]
    pub updated_at: i64,
}

impl Entity for WeeklyPlan {
    const TABLE: &'static str = "weekly_plans";

    entity_accessors!();

    fn validate(&self) -> AppResult<()> {
        optional_text_within("focus", self.focus.as_deref(), 2_000)?;
        optional_text_within("reflection", self.reflection.as_deref(), 10_000)
    }

    fn default_order() -> Vec<OrderBy> {
        vec![OrderBy::desc("week_start")]
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewWeeklyPlan {
    pub week_start: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus: Option<String>,
}

/// One line of the personal mission statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct MissionItem {
    pub id: String,
    pub owner_id: String,
    pub statement: String,
    #[serde(default)]
    pub position: i32,
    #[ts(type = "number")]
    pub created_at: i64,
    #[ts(type = "number")]
    pub updated_at: i64,
}

impl Entity for MissionItem {
    const TABLE: &'static str = "mission_items";

    entity_accessors!();

    fn validate(&self) -> AppResult<()> {
        require_text("statement", &self.statement)
    }

    fn default_order() -> Vec<OrderBy> {
        vec![OrderBy::asc("position")]
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewMissionItem {
    pub statement: String,
    pub position: i32,
}
