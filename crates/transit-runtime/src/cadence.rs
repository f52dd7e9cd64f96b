//! Refresh cadences
//!
//! Live data is polled on a fixed interval that is shifted back by the feed
//! latency, so a poll lands just after the provider publishes. Timetables
//! are reloaded once per service day.

use transit_core::time::DAY;
use transit_core::Timestamp;

/// Fixed-interval poll, aligned to absolute interval boundaries.
#[derive(Debug, Clone)]
pub struct LiveRefresh {
    interval: i64,
    latency: i64,
    last_slot: Option<i64>,
}

impl LiveRefresh {
    pub fn new(interval: i64, latency: i64) -> Self {
        Self {
            interval: interval.max(1),
            latency,
            last_slot: None,
        }
    }

    fn slot(&self, now: Timestamp) -> i64 {
        (now - self.latency).div_euclid(self.interval)
    }

    /// True when `now` has entered a new interval since the last poll.
    pub fn is_due(&self, now: Timestamp) -> bool {
        self.last_slot != Some(self.slot(now))
    }

    pub fn mark(&mut self, now: Timestamp) {
        self.last_slot = Some(self.slot(now));
    }

    /// Force the next `is_due` to fire.
    pub fn force(&mut self) {
        self.last_slot = None;
    }

    pub fn interval(&self) -> i64 {
        self.interval
    }
}

/// Once-per-service-day reload, keyed by the service day start.
#[derive(Debug, Clone, Default)]
pub struct DailyReload {
    loaded_day: Option<Timestamp>,
}

impl DailyReload {
    pub fn new() -> Self {
        Self::default()
    }

    /// `day_start` is the start of the service day containing now.
    pub fn is_due(&self, day_start: Timestamp) -> bool {
        match self.loaded_day {
            None => true,
            Some(loaded) => day_start - loaded >= DAY,
        }
    }

    pub fn mark(&mut self, day_start: Timestamp) {
        self.loaded_day = Some(day_start);
    }
}
