//! Live reconciliation: typed patches merged onto train records

use crate::timetable::Train;
use transit_core::{RailwayId, StationId, TrainId};

/// Fields of a live report that may override timetable data.
///
/// `None` means "not reported" and never clears a value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LivePatch {
    /// Milliseconds
    pub delay: Option<i64>,
    pub car_composition: Option<u32>,
    pub train_type: Option<String>,
    pub origin: Option<StationId>,
    pub destination: Option<StationId>,
}

impl LivePatch {
    /// Merge into `train`. Returns true when a field that shapes the
    /// simulation changed, meaning an active instance must be restarted.
    pub fn apply(&self, train: &mut Train) -> bool {
        let mut changed = false;

        if let Some(delay) = self.delay.map(|d| d.max(0)) {
            if delay != train.delay {
                train.delay = delay;
                changed = true;
            }
        }
        if let Some(cars) = self.car_composition.filter(|c| *c > 0) {
            if cars != train.car_composition {
                train.car_composition = cars;
                changed = true;
            }
        }
        if let Some(kind) = &self.train_type {
            if train.train_type.as_ref() != Some(kind) {
                train.train_type = Some(kind.clone());
                changed = true;
            }
        }
        if truncate(train, self.origin.as_ref(), self.destination.as_ref()) {
            changed = true;
        }

        changed
    }
}

/// A live position report for one train
#[derive(Debug, Clone, PartialEq)]
pub struct LiveTrain {
    pub id: TrainId,
    pub railway: RailwayId,
    /// Feed direction name
    pub direction: String,
    pub number: Option<String>,
    pub from_station: Option<StationId>,
    pub to_station: Option<StationId>,
    pub patch: LivePatch,
}

/// Cut the stop list down to the live-reported origin and destination.
///
/// The new first stop loses its arrival and the new last stop turns its
/// departure into an arrival. Returns true if either end changed.
pub fn truncate(train: &mut Train, origin: Option<&StationId>, destination: Option<&StationId>) -> bool {
    let mut changed = false;

    if let (Some(current), Some(origin)) = (train.origin.as_ref(), origin) {
        if current != origin {
            train.origin = Some(origin.clone());
            if let Some(i) = train.stops.iter().position(|s| &s.station == origin) {
                train.stops[i].arrival = None;
                train.stops.drain(..i);
            }
            changed = true;
        }
    }

    if let (Some(current), Some(destination)) = (train.destination.as_ref(), destination) {
        if current != destination {
            train.destination = Some(destination.clone());
            if let Some(i) = train.stops.iter().position(|s| &s.station == destination) {
                let stop = &mut train.stops[i];
                let departure = stop.departure.take();
                stop.arrival = stop.arrival.take().or(departure);
                train.stops.truncate(i + 1);
            }
            changed = true;
        }
    }

    changed
}
