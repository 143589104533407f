//! Wall-clock arithmetic for weekly feed triggers and the daily catalog refresh.

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc, Weekday};

/// Source of "now". Production uses [`SystemClock`]; tests substitute a clock
/// driven by tokio's paused time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Next `weekday` at `at` (UTC) strictly after `now`.
pub fn next_weekly(weekday: Weekday, at: NaiveTime, now: DateTime<Utc>) -> DateTime<Utc> {
    let days_ahead = (7 + weekday.num_days_from_monday() as i64
        - now.weekday().num_days_from_monday() as i64)
        % 7;
    let candidate = (now.date_naive() + Duration::days(days_ahead))
        .and_time(at)
        .and_utc();
    if candidate <= now {
        candidate + Duration::days(7)
    } else {
        candidate
    }
}

/// Next daily instant `lead` before `cutoff` (UTC), strictly after `now`.
pub fn next_daily(cutoff: NaiveTime, lead: Duration, now: DateTime<Utc>) -> DateTime<Utc> {
    let mut next = now.date_naive().and_time(cutoff).and_utc() - lead;
    while next <= now {
        next += Duration::days(1);
    }
    next
}

/// Time left until `target`, zero if it has passed.
pub fn until(target: DateTime<Utc>, now: DateTime<Utc>) -> std::time::Duration {
    (target - now).to_std().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_next_weekly_later_this_week() {
        // 2026-10-19 is a Monday.
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let next = next_weekly(Weekday::Wed, at(1, 30), now);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 10, 21, 1, 30, 0).unwrap());
    }

    #[test]
    fn test_next_weekly_same_day_passed() {
        let now = Utc.with_ymd_and_hms(2026, 10, 21, 1, 30, 0).unwrap();
        let next = next_weekly(Weekday::Wed, at(1, 30), now);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 10, 28, 1, 30, 0).unwrap());
    }

    #[test]
    fn test_next_weekly_same_day_pending() {
        let now = Utc.with_ymd_and_hms(2026, 10, 21, 0, 10, 0).unwrap();
        let next = next_weekly(Weekday::Wed, at(1, 30), now);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 10, 21, 1, 30, 0).unwrap());
    }

    #[test]
    fn test_next_weekly_wraps_week() {
        let now = Utc.with_ymd_and_hms(2026, 10, 23, 9, 0, 0).unwrap(); // Friday
        let next = next_weekly(Weekday::Tue, at(1, 30), now);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 10, 27, 1, 30, 0).unwrap());
    }

    #[test]
    fn test_next_daily_before_midnight() {
        let lead = Duration::minutes(30);
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        assert_eq!(
            next_daily(at(0, 0), lead, now),
            Utc.with_ymd_and_hms(2026, 10, 19, 23, 30, 0).unwrap()
        );
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 23, 45, 0).unwrap();
        assert_eq!(
            next_daily(at(0, 0), lead, now),
            Utc.with_ymd_and_hms(2026, 10, 20, 23, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_until_never_negative() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        assert_eq!(until(now - Duration::hours(1), now), std::time::Duration::ZERO);
        assert_eq!(until(now + Duration::seconds(5), now).as_secs(), 5);
    }
}
