//! Service clock - converts timetable `HH:MM` strings into absolute timestamps.
//!
//! Timetables are published in the operator's local time and a service day
//! runs past midnight: a train departing at `00:40` belongs to the previous
//! day's timetable. Times before the day boundary are therefore rolled
//! forward by 24 hours, and when "now" itself is before the boundary the whole
//! service day is shifted back by 24 hours.

use crate::{Result, TransitError};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Timelike, Weekday};
use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch
pub type Timestamp = i64;

pub const SECOND: i64 = 1_000;
pub const MINUTE: i64 = 60 * SECOND;
pub const HOUR: i64 = 60 * MINUTE;
pub const DAY: i64 = 24 * HOUR;

/// Which timetable variant runs on a service day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayKind {
    Weekday,
    Holiday,
}

/// Local-time calendar of the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceClock {
    /// Offset of local time from UTC in minutes (+09:00 by default)
    #[serde(default = "default_utc_offset")]
    pub utc_offset_minutes: i32,
    /// Hour at which one service day ends and the next begins
    #[serde(default = "default_day_boundary")]
    pub day_boundary_hour: u32,
    /// Added to every parsed time to absorb feed measurement latency
    #[serde(default = "default_precision_slack")]
    pub precision_slack_ms: i64,
    /// Dates that run the holiday timetable besides weekends
    #[serde(default)]
    pub holidays: Vec<NaiveDate>,
}

fn default_utc_offset() -> i32 {
    9 * 60
}
fn default_day_boundary() -> u32 {
    3
}
fn default_precision_slack() -> i64 {
    25_000
}

impl Default for ServiceClock {
    fn default() -> Self {
        Self {
            utc_offset_minutes: default_utc_offset(),
            day_boundary_hour: default_day_boundary(),
            precision_slack_ms: default_precision_slack(),
            holidays: Vec::new(),
        }
    }
}

impl ServiceClock {
    fn offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            TransitError::ConfigError(format!(
                "UTC offset out of range: {} minutes",
                self.utc_offset_minutes
            ))
        })
    }

    fn local(&self, now: Timestamp) -> Result<DateTime<FixedOffset>> {
        let offset = self.offset()?;
        DateTime::from_timestamp_millis(now)
            .map(|utc| utc.with_timezone(&offset))
            .ok_or_else(|| TransitError::ParseError(format!("timestamp out of range: {now}")))
    }

    /// Local midnight of the calendar date `now` falls on.
    fn local_midnight(&self, now: Timestamp) -> Result<Timestamp> {
        let local = self.local(now)?;
        let since_midnight = local.num_seconds_from_midnight() as i64 * SECOND
            + (local.timestamp_subsec_millis() as i64);
        Ok(now - since_midnight)
    }

    /// Absolute time of a timetable `HH:MM` string within the service day
    /// containing `now`, with the precision slack applied.
    pub fn time_of(&self, hhmm: &str, now: Timestamp) -> Result<Timestamp> {
        let (hours, minutes) = parse_hhmm(hhmm)?;
        let local = self.local(now)?;
        let boundary = self.day_boundary_hour as i64;

        let parsed = hours as i64;
        let mut hours = parsed;
        if (local.hour() as i64) < boundary {
            hours -= 24;
        }
        if parsed < boundary {
            hours += 24;
        }

        Ok(self.local_midnight(now)? + hours * HOUR + minutes as i64 * MINUTE
            + self.precision_slack_ms)
    }

    /// Local `HH:MM` rendering of a timestamp.
    pub fn format_hhmm(&self, time: Timestamp) -> Result<String> {
        let local = self.local(time)?;
        Ok(format!("{:02}:{:02}", local.hour(), local.minute()))
    }

    /// Calendar date of the service day containing `now`.
    pub fn service_date(&self, now: Timestamp) -> Result<NaiveDate> {
        let local = self.local(now)?;
        let date = local.date_naive();
        if local.hour() < self.day_boundary_hour {
            date.pred_opt()
                .ok_or_else(|| TransitError::ParseError(format!("no day before {date}")))
        } else {
            Ok(date)
        }
    }

    /// Start of the service day containing `now` (the most recent boundary).
    pub fn service_day_start(&self, now: Timestamp) -> Result<Timestamp> {
        let local = self.local(now)?;
        let mut start = self.local_midnight(now)? + self.day_boundary_hour as i64 * HOUR;
        if local.hour() < self.day_boundary_hour {
            start -= DAY;
        }
        Ok(start)
    }

    /// Timetable variant for the service day containing `now`.
    pub fn day_kind(&self, now: Timestamp) -> Result<DayKind> {
        let date = self.service_date(now)?;
        let weekend = matches!(date.weekday(), Weekday::Sat | Weekday::Sun);
        if weekend || self.holidays.contains(&date) {
            Ok(DayKind::Holiday)
        } else {
            Ok(DayKind::Weekday)
        }
    }
}

/// Parse `HH:MM` into hours and minutes. Hours up to 47 are accepted since
/// some feeds write post-midnight times as `24:10`.
pub fn parse_hhmm(s: &str) -> Result<(u32, u32)> {
    let (h, m) = s
        .trim()
        .split_once(':')
        .ok_or_else(|| TransitError::InvalidTime(s.to_string()))?;
    let hours: u32 = h.parse().map_err(|_| TransitError::InvalidTime(s.to_string()))?;
    let minutes: u32 = m.parse().map_err(|_| TransitError::InvalidTime(s.to_string()))?;
    if hours > 47 || minutes > 59 {
        return Err(TransitError::InvalidTime(s.to_string()));
    }
    Ok((hours, minutes))
}

/// Wall-clock now, for hosts that drive the simulation in real time.
pub fn now_millis() -> Timestamp {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn jst(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> Timestamp {
        FixedOffset::east_opt(9 * 3600)
            .unwrap()
            .with_ymd_and_hms(y, mo, d, h, mi, 0)
            .unwrap()
            .timestamp_millis()
    }

    fn clock() -> ServiceClock {
        ServiceClock {
            precision_slack_ms: 0,
            ..ServiceClock::default()
        }
    }

    #[test]
    fn parse_valid_and_invalid() {
        assert_eq!(parse_hhmm("08:05").unwrap(), (8, 5));
        assert_eq!(parse_hhmm("24:30").unwrap(), (24, 30));
        assert!(parse_hhmm("8h05").is_err());
        assert!(parse_hhmm("10:75").is_err());
        assert!(parse_hhmm("").is_err());
    }

    #[test]
    fn daytime_string_maps_to_same_day() {
        let now = jst(2026, 10, 19, 10, 0);
        assert_eq!(clock().time_of("08:30", now).unwrap(), jst(2026, 10, 19, 8, 30));
    }

    #[test]
    fn after_midnight_belongs_to_previous_service_day() {
        let evening = jst(2026, 10, 19, 23, 0);
        assert_eq!(clock().time_of("00:40", evening).unwrap(), jst(2026, 10, 20, 0, 40));

        let small_hours = jst(2026, 10, 20, 1, 0);
        assert_eq!(clock().time_of("23:50", small_hours).unwrap(), jst(2026, 10, 19, 23, 50));
        assert_eq!(clock().time_of("00:40", small_hours).unwrap(), jst(2026, 10, 20, 0, 40));
    }

    #[test]
    fn slack_is_added() {
        let now = jst(2026, 10, 19, 10, 0);
        let c = ServiceClock::default();
        assert_eq!(c.time_of("08:30", now).unwrap(), jst(2026, 10, 19, 8, 30) + 25_000);
    }

    #[test]
    fn format_round_trip() {
        let c = clock();
        let t = jst(2026, 10, 19, 7, 4);
        assert_eq!(c.format_hhmm(t).unwrap(), "07:04");
    }

    #[test]
    fn service_day_start_before_boundary() {
        let c = clock();
        assert_eq!(c.service_day_start(jst(2026, 10, 20, 1, 0)).unwrap(), jst(2026, 10, 19, 3, 0));
        assert_eq!(c.service_day_start(jst(2026, 10, 20, 4, 0)).unwrap(), jst(2026, 10, 20, 3, 0));
    }

    #[test]
    fn day_kind_weekend_and_holiday() {
        let mut c = clock();
        // 2026-10-19 is a Monday
        assert_eq!(c.day_kind(jst(2026, 10, 19, 12, 0)).unwrap(), DayKind::Weekday);
        // 02:00 on Monday still runs Sunday's timetable
        assert_eq!(c.day_kind(jst(2026, 10, 19, 2, 0)).unwrap(), DayKind::Holiday);
        c.holidays.push(NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());
        assert_eq!(c.day_kind(jst(2026, 10, 19, 12, 0)).unwrap(), DayKind::Holiday);
    }
}
