//! Streak and completion-rate calculations over completion days.
//!
//! Pure functions: callers resolve "today" in the owner's timezone and pass
//! the set of days a ritual was completed on.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::time::previous_day;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StreakStats {
    pub current: u32,
    pub longest: u32,
    /// Rounded percentage, 0..=100.
    pub completion_rate: u8,
}

impl StreakStats {
    pub fn compute<'a, I>(days: I, active_weekdays: &[u8], today: NaiveDate) -> Self
    where
        I: IntoIterator<Item = &'a NaiveDate>,
    {
        let days = normalise(days);
        Self {
            current: current_from(&days, today),
            longest: longest_from(&days),
            completion_rate: rate_from(&days, active_weekdays, today),
        }
    }
}

fn normalise<'a, I>(days: I) -> BTreeSet<NaiveDate>
where
    I: IntoIterator<Item = &'a NaiveDate>,
{
    days.into_iter().copied().collect()
}

/// Consecutive completed days ending today, or ending yesterday when today
/// has not been completed yet.
pub fn current_streak<'a, I>(days: I, today: NaiveDate) -> u32
where
    I: IntoIterator<Item = &'a NaiveDate>,
{
    current_from(&normalise(days), today)
}

fn current_from(days: &BTreeSet<NaiveDate>, today: NaiveDate) -> u32 {
    let mut cursor = if days.contains(&today) {
        today
    } else {
        previous_day(today)
    };
    let mut count = 0;
    while days.contains(&cursor) {
        count += 1;
        cursor = previous_day(cursor);
    }
    count
}

pub fn longest_streak<'a, I>(days: I) -> u32
where
    I: IntoIterator<Item = &'a NaiveDate>,
{
    longest_from(&normalise(days))
}

fn longest_from(days: &BTreeSet<NaiveDate>) -> u32 {
    let mut longest = 0;
    let mut run = 0;
    let mut prev: Option<NaiveDate> = None;
    for day in days {
        run = match prev {
            Some(p) if p.succ_opt() == Some(*day) => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        prev = Some(*day);
    }
    longest
}

/// Share of scheduled days so far this month that were completed.
///
/// `active_weekdays` uses Sunday = 0. Returns 0 when nothing has been
/// scheduled yet this month.
pub fn monthly_completion_rate<'a, I>(days: I, active_weekdays: &[u8], today: NaiveDate) -> u8
where
    I: IntoIterator<Item = &'a NaiveDate>,
{
    rate_from(&normalise(days), active_weekdays, today)
}

fn rate_from(days: &BTreeSet<NaiveDate>, active_weekdays: &[u8], today: NaiveDate) -> u8 {
    let scheduled = |day: &NaiveDate| {
        active_weekdays.contains(&(day.weekday().num_days_from_sunday() as u8))
    };
    let Some(month_start) = today.with_day(1) else {
        return 0;
    };
    let elapsed = month_start
        .iter_days()
        .take_while(|day| *day <= today)
        .filter(scheduled)
        .count();
    if elapsed == 0 {
        return 0;
    }
    let done = days
        .range(month_start..=today)
        .filter(|day| scheduled(*day))
        .count();
    ((done as f64 / elapsed as f64) * 100.0).round().min(100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn back(today: NaiveDate, offsets: &[i64]) -> Vec<NaiveDate> {
        offsets.iter().map(|o| today - Duration::days(*o)).collect()
    }

    #[test]
    fn current_streak_counts_through_today() {
        let today = d(2024, 5, 15);
        assert_eq!(current_streak(&back(today, &[0, 1, 2]), today), 3);
    }

    #[test]
    fn current_streak_tolerates_open_today() {
        let today = d(2024, 5, 15);
        assert_eq!(current_streak(&back(today, &[1, 2]), today), 2);
    }

    #[test]
    fn current_streak_breaks_on_gap() {
        let today = d(2024, 5, 15);
        assert_eq!(current_streak(&back(today, &[5]), today), 0);
        assert_eq!(current_streak(&back(today, &[0, 2, 3]), today), 1);
        assert_eq!(current_streak(&Vec::new(), today), 0);
    }

    #[test]
    fn current_streak_crosses_month_boundary() {
        let today = d(2024, 3, 1);
        let days = [d(2024, 2, 28), d(2024, 2, 29), d(2024, 3, 1)];
        assert_eq!(current_streak(&days, today), 3);
    }

    #[test]
    fn longest_streak_finds_max_run() {
        let days = [
            d(2024, 1, 1),
            d(2024, 1, 2),
            d(2024, 1, 3),
            d(2024, 1, 4),
            d(2024, 1, 10),
        ];
        assert_eq!(longest_streak(&days), 4);
    }

    #[test]
    fn longest_streak_ignores_duplicates_and_order() {
        let days = [d(2024, 1, 3), d(2024, 1, 1), d(2024, 1, 2), d(2024, 1, 2)];
        assert_eq!(longest_streak(&days), 3);
        assert_eq!(longest_streak(&Vec::new()), 0);
    }

    #[test]
    fn completion_rate_counts_scheduled_days_only() {
        // June 2024: the 1st is a Saturday. Through the 10th there are
        // Mondays on the 3rd and 10th and Wednesdays on the 5th.
        let today = d(2024, 6, 10);
        let weekdays = [1, 3];
        let days = [d(2024, 6, 3), d(2024, 6, 4), d(2024, 6, 10), d(2024, 5, 29)];
        // 2 of 3 scheduled days done; the Tuesday and the May day do not count.
        assert_eq!(monthly_completion_rate(&days, &weekdays, today), 67);
    }

    #[test]
    fn completion_rate_is_zero_before_first_scheduled_day() {
        let today = d(2024, 6, 2);
        assert_eq!(monthly_completion_rate(&[today], &[1], today), 0);
    }

    #[test]
    fn completion_rate_caps_at_hundred() {
        let today = d(2024, 6, 3);
        let days: Vec<NaiveDate> = (1..=3).map(|day| d(2024, 6, day)).collect();
        assert_eq!(monthly_completion_rate(&days, &[0, 1, 2, 3, 4, 5, 6], today), 100);
    }

    #[test]
    fn stats_bundle_all_three() {
        let today = d(2024, 6, 5);
        let days = back(today, &[0, 1, 2, 3]);
        let stats = StreakStats::compute(&days, &[0, 1, 2, 3, 4, 5, 6], today);
        assert_eq!(stats.current, 4);
        assert_eq!(stats.longest, 4);
        assert_eq!(stats.completion_rate, 80);
    }
}
