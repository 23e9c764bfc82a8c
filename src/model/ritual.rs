use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::{require_text, Entity};
use crate::store::OrderBy;
use crate::streaks::StreakStats;
use crate::sync_errors::validation_error;
use crate::AppResult;

/// Weekdays numbered from Sunday = 0.
pub const ALL_DAYS: [u8; 7] = [0, 1, 2, 3, 4, 5, 6];

fn all_days() -> Vec<u8> {
    ALL_DAYS.to_vec()
}

fn active_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Ritual {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    #[serde(default)]
    #[ts(optional)]
    pub description: Option<String>,
    #[serde(default = "all_days")]
    pub days_of_week: Vec<u8>,
    #[serde(default = "active_default")]
    pub is_active: bool,
    #[ts(type = "number")]
    pub created_at: i64,
    #[ts(type = "number")]
    pub updated_at: i64,
    #[serde(skip)]
    #[ts(skip)]
    pub stats: Option<StreakStats>,
}

impl Ritual {
    pub fn is_scheduled_on(&self, day: NaiveDate) -> bool {
        let weekday = day.weekday().num_days_from_sunday() as u8;
        self.days_of_week.contains(&weekday)
    }
}

impl Entity for Ritual {
    const TABLE: &'static str = "rituals";
    const BOOL_FIELDS: &'static [&'static str] = &["is_active"];
    const JSON_FIELDS: &'static [&'static str] = &["days_of_week"];

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
        if self.days_of_week.is_empty() {
            return Err(validation_error("days_of_week", "pick at least one day"));
        }
        if let Some(day) = self.days_of_week.iter().find(|d| **d > 6) {
            return Err(validation_error(
                "days_of_week",
                format!("{day} is not a weekday number"),
            ));
        }
        Ok(())
    }

    /// Stats depend on the schedule, so they are dropped when it changes.
    fn carry_derived(&mut self, prev: &Self) {
        if self.stats.is_none() && self.days_of_week == prev.days_of_week {
            self.stats = prev.stats;
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NewRitual {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_of_week: Option<Vec<u8>>,
}

impl NewRitual {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn on_days(mut self, days: Vec<u8>) -> Self {
        self.days_of_week = Some(days);
        self
    }
}

/// One day's completion of a ritual. Unique per (ritual, day).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct RitualCompletion {
    pub id: String,
    pub owner_id: String,
    pub ritual_id: String,
    #[ts(type = "string")]
    pub completed_on: NaiveDate,
    #[serde(default = "active_default")]
    pub completed: bool,
    #[ts(type = "number")]
    pub created_at: i64,
    #[ts(type = "number")]
    pub updated_at: i64,
}

impl Entity for RitualCompletion {
    const TABLE: &'static str = "ritual_completions";
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
        require_text("ritual_id", &self.ritual_id)
    }

    fn default_order() -> Vec<OrderBy> {
        vec![OrderBy::desc("completed_on")]
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewRitualCompletion {
    pub ritual_id: String,
    pub completed_on: NaiveDate,
    pub completed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ritual(days: Vec<u8>) -> Ritual {
        Ritual {
            id: "r1".into(),
            owner_id: "u1".into(),
            title: "Journal".into(),
            description: None,
            days_of_week: days,
            is_active: true,
            created_at: 0,
            updated_at: 0,
            stats: None,
        }
    }

    #[test]
    fn schedule_uses_sunday_zero() {
        let r = ritual(vec![0, 6]);
        // 2024-06-01 is a Saturday, 2024-06-02 a Sunday, 2024-06-03 a Monday.
        assert!(r.is_scheduled_on(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()));
        assert!(r.is_scheduled_on(NaiveDate::from_ymd_opt(2024, 6, 2).unwrap()));
        assert!(!r.is_scheduled_on(NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()));
    }

    #[test]
    fn weekday_numbers_are_bounded() {
        assert!(ritual(vec![1, 7]).validate().is_err());
        assert!(ritual(vec![]).validate().is_err());
        assert!(ritual(vec![1, 2]).validate().is_ok());
    }

    #[test]
    fn derived_stats_survive_replacement() {
        let mut prev = ritual(vec![1]);
        prev.stats = Some(StreakStats {
            current: 2,
            longest: 5,
            completion_rate: 40,
        });
        let mut next = ritual(vec![1]);
        next.title = "Renamed".into();
        next.carry_derived(&prev);
        assert_eq!(next.stats.as_ref().map(|s| s.longest), Some(5));
    }

    #[test]
    fn schedule_change_drops_stats() {
        let mut prev = ritual(vec![1]);
        prev.stats = Some(StreakStats {
            current: 2,
            longest: 5,
            completion_rate: 40,
        });
        let mut next = ritual(vec![1, 2]);
        next.carry_derived(&prev);
        assert!(next.stats.is_none());
    }
}
