use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;

/// Canonical day key format shared with the view layer.
pub const DAY_KEY_FORMAT: &str = "%Y-%m-%d";

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn to_date(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_default()
}

/// Calendar day an instant falls on for the owner's timezone.
///
/// Completions are stored at day granularity, so the instant is resolved in
/// local time before the date is taken. Callers never compare raw instants.
pub fn local_day(ms: i64, tz: Tz) -> NaiveDate {
    to_date(ms).with_timezone(&tz).date_naive()
}

pub fn today_in(tz: Tz) -> NaiveDate {
    local_day(now_ms(), tz)
}

pub fn day_key(day: NaiveDate) -> String {
    day.format(DAY_KEY_FORMAT).to_string()
}

pub fn parse_day_key(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DAY_KEY_FORMAT).ok()
}

pub fn previous_day(day: NaiveDate) -> NaiveDate {
    day - Duration::days(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_ms_is_reasonable() {
        let a = now_ms();
        assert!(a > 1_500_000_000_000); // after 2017
        assert!(a < 4_100_000_000_000); // before year ~2100
    }

    #[test]
    fn to_date_epoch() {
        assert_eq!(to_date(0).timestamp_millis(), 0);
    }

    #[test]
    fn local_day_respects_timezone() {
        // 2024-03-10T02:30:00Z is still the 9th in New York.
        let ms = 1_710_037_800_000;
        assert_eq!(
            local_day(ms, chrono_tz::America::New_York),
            NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
        );
        assert_eq!(
            local_day(ms, chrono_tz::UTC),
            NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
        );
    }

    #[test]
    fn day_keys_round_trip() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(day_key(day), "2024-01-05");
        assert_eq!(parse_day_key("2024-01-05"), Some(day));
        assert_eq!(parse_day_key("05/01/2024"), None);
    }
}
