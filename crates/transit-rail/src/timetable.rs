//! Timetable entries and the train records linked from them

use crate::railway::{Direction, Railway};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use transit_core::{RailwayId, Result, ServiceClock, StationId, Timestamp, TrainId, TransitError};

/// One stop of a timetable, times as local `HH:MM`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopTime {
    pub station: StationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub departure: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrival: Option<String>,
}

impl StopTime {
    pub fn new(station: &str, arrival: Option<&str>, departure: Option<&str>) -> Self {
        Self {
            station: station.into(),
            departure: departure.map(str::to_string),
            arrival: arrival.map(str::to_string),
        }
    }
}

/// A train as published in the timetable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimetableEntry {
    pub id: TrainId,
    pub railway: RailwayId,
    /// Feed direction name
    pub direction: String,
    #[serde(default)]
    pub train_type: Option<String>,
    #[serde(default)]
    pub number: Option<String>,
    pub stops: Vec<StopTime>,
    #[serde(default)]
    pub previous: Vec<TrainId>,
    #[serde(default)]
    pub next: Vec<TrainId>,
    #[serde(default)]
    pub origin: Option<StationId>,
    #[serde(default)]
    pub destination: Option<StationId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainKind {
    Timetabled,
    /// Reported by the live feed without a timetable entry
    AdHoc,
    /// Demo train running back and forth without a timetable
    Shuttle,
}

/// Lifecycle tag of a train
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainPhase {
    Inactive,
    Standing,
    Running,
    /// Continued as its linked next train
    NextLeg,
    Terminated,
}

impl TrainPhase {
    pub fn is_active(self) -> bool {
        matches!(self, TrainPhase::Standing | TrainPhase::Running)
    }
}

/// A train known to the simulation
#[derive(Debug, Clone)]
pub struct Train {
    pub id: TrainId,
    pub railway: RailwayId,
    pub kind: TrainKind,
    pub phase: TrainPhase,
    pub direction: Direction,
    pub train_type: Option<String>,
    pub number: Option<String>,
    /// Empty unless timetabled
    pub stops: Vec<StopTime>,
    pub origin: Option<StationId>,
    pub destination: Option<StationId>,
    pub previous: Option<TrainId>,
    pub next: Option<TrainId>,
    /// Activation window, before delay
    pub start: Timestamp,
    pub end: Timestamp,
    /// Milliseconds
    pub delay: i64,
    pub car_composition: u32,
    /// Live position of ad hoc trains
    pub from_station: Option<StationId>,
    pub to_station: Option<StationId>,
    pub last_seen: Option<Timestamp>,
}

impl Train {
    /// Whether `now` falls in the delayed activation window
    pub fn in_window(&self, now: Timestamp) -> bool {
        self.start + self.delay <= now && now <= self.end + self.delay
    }

    /// Recompute the activation window from the stop list: start one standing
    /// duration before the first departure, end at the last arrival (or the
    /// last departure, or the one before it).
    pub fn update_window(&mut self, clock: &ServiceClock, standing: i64, now: Timestamp) -> Result<()> {
        let first = self
            .stops
            .first()
            .ok_or_else(|| TransitError::ParseError(format!("train {} has no stops", self.id)))?;
        let departure = first.departure.as_deref().ok_or_else(|| {
            TransitError::ParseError(format!("train {} has no first departure", self.id))
        })?;

        let len = self.stops.len();
        let last = &self.stops[len - 1];
        let end = last
            .arrival
            .as_deref()
            .or(last.departure.as_deref())
            .or(self.stops[len.saturating_sub(2)].departure.as_deref())
            .ok_or_else(|| TransitError::ParseError(format!("train {} has no final time", self.id)))?;

        self.start = clock.time_of(departure, now)? - standing;
        self.end = clock.time_of(end, now)?;
        Ok(())
    }
}

/// Build train records from timetable entries.
///
/// Entries on unknown railways or without usable times are skipped with a
/// warning. Duplicate ids keep the later entry. Continuation links resolve
/// to the first listed id that exists; a train with a continuation borrows
/// its final departure time from the continuation's first stop.
pub fn link_timetable(
    entries: Vec<TimetableEntry>,
    railways: &HashMap<RailwayId, Railway>,
    clock: &ServiceClock,
    standing: i64,
    now: Timestamp,
) -> BTreeMap<TrainId, Train> {
    let mut lookup: BTreeMap<TrainId, TimetableEntry> = BTreeMap::new();
    for entry in entries {
        if let Some(previous) = lookup.insert(entry.id.clone(), entry) {
            tracing::warn!(
                "{}",
                TransitError::ReconciliationConflict(format!(
                    "duplicate timetable id {}, keeping the later entry",
                    previous.id
                ))
            );
        }
    }

    let mut trains = BTreeMap::new();
    for entry in lookup.values() {
        match link_entry(entry, &lookup, railways, clock, standing, now) {
            Ok(train) => {
                trains.insert(train.id.clone(), train);
            }
            Err(err) => tracing::warn!("Skipping timetable entry {}: {}", entry.id, err),
        }
    }

    tracing::debug!("Linked {} of {} timetable entries", trains.len(), lookup.len());
    trains
}

fn link_entry(
    entry: &TimetableEntry,
    lookup: &BTreeMap<TrainId, TimetableEntry>,
    railways: &HashMap<RailwayId, Railway>,
    clock: &ServiceClock,
    standing: i64,
    now: Timestamp,
) -> Result<Train> {
    let railway = railways
        .get(&entry.railway)
        .ok_or_else(|| TransitError::UnknownRoute(entry.railway.to_string()))?;

    let previous = entry.previous.iter().find(|id| lookup.contains_key(*id)).cloned();
    let next = entry.next.iter().find(|id| lookup.contains_key(*id)).cloned();

    let mut stops = entry.stops.clone();
    if let Some(continuation) = next.as_ref().and_then(|id| lookup.get(id)) {
        if let (Some(last), Some(first)) = (stops.last_mut(), continuation.stops.first()) {
            last.departure = first.departure.clone();
        }
    }

    let mut train = Train {
        id: entry.id.clone(),
        railway: entry.railway.clone(),
        kind: TrainKind::Timetabled,
        phase: TrainPhase::Inactive,
        direction: railway.direction_of(&entry.direction),
        train_type: entry.train_type.clone(),
        number: entry.number.clone(),
        origin: entry.origin.clone().or_else(|| stops.first().map(|s| s.station.clone())),
        destination: entry
            .destination
            .clone()
            .or_else(|| stops.last().map(|s| s.station.clone())),
        stops,
        previous,
        next,
        start: 0,
        end: 0,
        delay: 0,
        car_composition: railway.car_composition,
        from_station: None,
        to_station: None,
        last_seen: None,
    };
    train.update_window(clock, standing, now)?;
    Ok(train)
}
