//! Scenario files: a network, timetables and timed live snapshots, replayed
//! against a simulated clock

use crate::feed::{FeedProvider, LiveSnapshot};
use crate::network::Network;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::path::Path;
use transit_core::{DayKind, Result, Timestamp, TransitError};
use transit_rail::TimetableEntry;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Timetables {
    #[serde(default)]
    pub weekday: Vec<TimetableEntry>,
    #[serde(default)]
    pub holiday: Vec<TimetableEntry>,
}

/// A live snapshot as published at `at`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimedSnapshot {
    pub at: DateTime<FixedOffset>,
    #[serde(flatten)]
    pub snapshot: LiveSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    /// Simulated time between two host ticks
    #[serde(default = "default_step")]
    pub step_ms: i64,
    pub network: Network,
    #[serde(default)]
    pub timetables: Timetables,
    #[serde(default)]
    pub snapshots: Vec<TimedSnapshot>,
    /// Run one demo shuttle per railway as well
    #[serde(default)]
    pub shuttle: bool,
}

fn default_step() -> i64 {
    1_000
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content).map_err(|e| match e {
            TransitError::JsonError(msg) => {
                TransitError::JsonError(format!("Failed to parse scenario {}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let scenario: Scenario =
            serde_json::from_str(content).map_err(|e| TransitError::JsonError(e.to_string()))?;
        if scenario.end < scenario.start {
            return Err(TransitError::ParseError(format!(
                "scenario {} ends before it starts",
                scenario.name
            )));
        }
        if scenario.step_ms <= 0 {
            return Err(TransitError::ParseError(format!(
                "scenario {} has a non-positive step {}",
                scenario.name, scenario.step_ms
            )));
        }
        Ok(scenario)
    }

    pub fn start_ms(&self) -> Timestamp {
        self.start.timestamp_millis()
    }

    pub fn end_ms(&self) -> Timestamp {
        self.end.timestamp_millis()
    }

    /// Tick times from start to end inclusive
    pub fn ticks(&self) -> impl Iterator<Item = Timestamp> {
        let step = self.step_ms.max(1) as usize;
        (self.start_ms()..=self.end_ms()).step_by(step)
    }
}

/// Feed provider serving a scenario's recorded data
pub struct ReplayFeed {
    name: String,
    timetables: Timetables,
    /// Sorted by publication time
    snapshots: Vec<(Timestamp, LiveSnapshot)>,
}

impl ReplayFeed {
    pub fn new(scenario: &Scenario) -> Self {
        let mut snapshots: Vec<(Timestamp, LiveSnapshot)> = scenario
            .snapshots
            .iter()
            .map(|s| (s.at.timestamp_millis(), s.snapshot.clone()))
            .collect();
        snapshots.sort_by_key(|(at, _)| *at);

        Self {
            name: format!("replay:{}", scenario.name),
            timetables: scenario.timetables.clone(),
            snapshots,
        }
    }
}

impl FeedProvider for ReplayFeed {
    fn name(&self) -> &str {
        &self.name
    }

    fn timetable(&mut self, day: DayKind) -> Result<Vec<TimetableEntry>> {
        Ok(match day {
            DayKind::Weekday => self.timetables.weekday.clone(),
            DayKind::Holiday => self.timetables.holiday.clone(),
        })
    }

    /// The latest snapshot published at or before `now`
    fn live(&mut self, now: Timestamp) -> Result<LiveSnapshot> {
        self.snapshots
            .iter()
            .rev()
            .find(|(at, _)| *at <= now)
            .map(|(_, snapshot)| snapshot.clone())
            .ok_or_else(|| TransitError::FeedUnavailable(format!("no snapshot published by {now}")))
    }
}
