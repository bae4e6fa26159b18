//! Weekly matching cycle calendar.
//!
//! A cycle is identified by the Monday that starts it in the service time zone
//! (`week_of`, formatted `YYYY-MM-DD`). Matches sent during a cycle stay open
//! until Friday 23:59 local time of that same week.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;

const WEEK_OF_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchWeek {
    monday: NaiveDate,
    tz: Tz,
}

impl MatchWeek {
    /// The cycle that contains `now`, judged by the local calendar date.
    pub fn containing(now: DateTime<Utc>, tz: Tz) -> Self {
        let local = now.with_timezone(&tz).date_naive();
        let offset = local.weekday().num_days_from_monday() as i64;
        Self {
            monday: local - Duration::days(offset),
            tz,
        }
    }

    pub fn parse(week_of: &str, tz: Tz) -> Option<Self> {
        let date = NaiveDate::parse_from_str(week_of, WEEK_OF_FORMAT).ok()?;
        (date.weekday() == Weekday::Mon).then_some(Self { monday: date, tz })
    }

    pub fn label(&self) -> String {
        self.monday.format(WEEK_OF_FORMAT).to_string()
    }

    /// Friday 23:59:00 local time of this week.
    pub fn expires_at(&self) -> DateTime<Utc> {
        let friday = self.monday + Duration::days(4);
        let cutoff = NaiveTime::from_hms_opt(23, 59, 0).unwrap_or(NaiveTime::MIN);
        resolve_local(self.tz, friday.and_time(cutoff))
    }

    pub fn weeks_back(&self, weeks: u32) -> Self {
        Self {
            monday: self.monday - Duration::weeks(weeks as i64),
            tz: self.tz,
        }
    }
}

/// Next instant strictly after `now` that falls on `weekday` at `hour:minute`
/// local time.
pub fn next_weekly_slot(now: DateTime<Utc>, tz: Tz, weekday: Weekday, hour: u32, minute: u32) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(hour.min(23), minute.min(59), 0).unwrap_or(NaiveTime::MIN);
    let today = now.with_timezone(&tz).date_naive();
    let ahead = (7 + weekday.num_days_from_monday() as i64
        - today.weekday().num_days_from_monday() as i64)
        % 7;

    let candidate = resolve_local(tz, (today + Duration::days(ahead)).and_time(time));
    if candidate > now {
        candidate
    } else {
        resolve_local(tz, (today + Duration::days(ahead + 7)).and_time(time))
    }
}

/// Maps a local wall-clock time to UTC. Ambiguous times (DST fall-back) take
/// the earlier instant; skipped times (spring-forward) move one hour later.
fn resolve_local(tz: Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}
