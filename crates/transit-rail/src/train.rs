//! Section assignment and per-train runtime state

use crate::railway::{Direction, Railway};
use crate::timetable::{Train, TrainPhase};
use transit_core::{RailwayId, ServiceClock, StationId, Timestamp, TrainId};
use transit_motion::{MotionProfile, PathSample};

/// The stretch of railway between two stops a train is serving.
///
/// `length` is signed: negative for descending trains. Station indices are
/// `index` and `index + length`.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub timetable_index: Option<usize>,
    pub index: usize,
    pub length: i32,
    pub departure_station: StationId,
    pub departure_time: Option<String>,
    pub arrival_station: Option<StationId>,
    pub arrival_time: Option<String>,
}

impl Section {
    pub fn from_index(&self) -> usize {
        self.index
    }

    pub fn to_index(&self) -> usize {
        (self.index as i64 + self.length as i64).max(0) as usize
    }

    /// Lower station index of the section, always in `[0, stations - 2]`
    pub fn segment_index(&self, stations: usize) -> usize {
        self.from_index()
            .min(self.to_index())
            .min(stations.saturating_sub(2))
    }

    pub fn is_stationary(&self) -> bool {
        self.length == 0
    }
}

/// Outcome of looking up the section at a timetable index
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Section(Section),
    /// No further section; the stop's departure time (if any) bounds the
    /// final dwell
    Terminal {
        timetable_index: usize,
        departure_time: Option<String>,
    },
}

/// Section of a timetabled train starting at stop `index`, or at the last
/// stop already departed (delay included) when `index` is `None`.
pub fn resolve_timetabled(
    train: &Train,
    railway: &Railway,
    index: Option<usize>,
    clock: &ServiceClock,
    now: Timestamp,
) -> Option<Resolution> {
    let stops = &train.stops;
    let tt_index = index.unwrap_or_else(|| {
        stops
            .iter()
            .enumerate()
            .filter_map(|(i, stop)| {
                let departure = clock.time_of(stop.departure.as_deref()?, now).ok()?;
                (departure + train.delay <= now).then_some(i)
            })
            .last()
            .unwrap_or(0)
    });

    let current = stops.get(tt_index)?;
    let departure_time = current.departure.clone().or_else(|| current.arrival.clone());

    let section = stops.get(tt_index + 1).and_then(|next| {
        let from = railway.find_station(&current.station, train.direction, None)?;
        let to = railway.find_station(&next.station, train.direction, Some(from))?;
        Some(Section {
            timetable_index: Some(tt_index),
            index: from,
            length: to as i32 - from as i32,
            departure_station: current.station.clone(),
            departure_time: departure_time.clone(),
            arrival_station: Some(next.station.clone()),
            arrival_time: next.arrival.clone().or_else(|| next.departure.clone()),
        })
    });

    Some(match section {
        Some(section) => Resolution::Section(section),
        None => Resolution::Terminal {
            timetable_index: tt_index,
            departure_time,
        },
    })
}

/// Section of an ad hoc train from its live `from`/`to` stations.
///
/// `position` is the station index the train currently occupies (after a
/// previous section). With `final_leg` the section runs straight to the
/// reported destination. `None` means the train has nowhere left to go.
pub fn resolve_ad_hoc(
    train: &Train,
    railway: &Railway,
    position: Option<usize>,
    final_leg: bool,
) -> Option<Section> {
    let departure = train.from_station.as_ref().or(train.to_station.as_ref())?;
    let arrival = train.to_station.as_ref().or(train.from_station.as_ref())?;
    let direction = train.direction;

    let current = railway.find_station(departure, direction, None)?;
    let next = railway.find_station(arrival, direction, Some(current));
    let destination = train
        .destination
        .as_ref()
        .and_then(|d| railway.find_station(d, direction, Some(current)));

    if destination == Some(current) {
        return None;
    }
    let target = if final_leg { destination? } else { next? };
    let actual = position.unwrap_or(current);

    // Never run against the direction of travel
    let mut length = target as i32 - actual as i32;
    if length * direction.sign() < 0 {
        length = 0;
    }

    let arrival_station = if arrival == departure {
        let ahead = current as i64 + direction.sign() as i64;
        usize::try_from(ahead)
            .ok()
            .and_then(|i| railway.stations.get(i))
            .cloned()
    } else {
        Some(arrival.clone())
    };

    Some(Section {
        timetable_index: None,
        index: actual,
        length,
        departure_station: departure.clone(),
        departure_time: None,
        arrival_station,
        arrival_time: None,
    })
}

/// Runtime state of a train while it is standing or running
#[derive(Debug, Clone)]
pub struct ActiveTrain {
    pub phase: TrainPhase,
    pub section: Section,
    pub profile: Option<MotionProfile>,
    /// The current dwell ends the train's service
    pub final_stop: bool,
    pub direction: Direction,
    pub cars: u32,
}

impl ActiveTrain {
    pub fn new(section: Section, direction: Direction, cars: u32) -> Self {
        Self {
            phase: TrainPhase::Standing,
            section,
            profile: None,
            final_stop: false,
            direction,
            cars,
        }
    }

    /// Distance along the path after covering `progress` of the section
    pub fn lead_distance(&self, railway: &Railway, progress: f64) -> Option<f64> {
        let from = railway.offset(self.section.from_index())?;
        let to = railway.offset(self.section.to_index())?;
        Some(from + (to - from) * progress)
    }

    /// Section length in meters
    pub fn section_distance(&self, railway: &Railway) -> Option<f64> {
        Some((railway.offset(self.section.to_index())? - railway.offset(self.section.from_index())?).abs())
    }
}

/// Why a train left the active set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Finished its final dwell
    Terminated,
    /// Continued as its linked next train
    HandedOff,
    /// Live data changed; the train restarts on the next refresh
    Reconciled,
    /// Railway disrupted and the train is not reported live
    Suspended,
    /// Ad hoc train not reported for the retention period
    Expired,
    /// Torn down with every other entity
    Reset,
    /// Inconsistent data (duplicate ids, missing railway)
    Fault,
}

impl StopReason {
    /// Lifecycle tag the train is left in
    pub fn phase(self) -> TrainPhase {
        match self {
            StopReason::Terminated | StopReason::Expired | StopReason::Fault => TrainPhase::Terminated,
            StopReason::HandedOff => TrainPhase::NextLeg,
            StopReason::Reconciled | StopReason::Suspended | StopReason::Reset => TrainPhase::Inactive,
        }
    }
}

/// UI-facing description of a train
#[derive(Debug, Clone, PartialEq)]
pub struct TrainStatus {
    pub train: TrainId,
    pub railway: RailwayId,
    pub train_type: Option<String>,
    pub number: Option<String>,
    pub direction: Direction,
    /// Lower station index of the current section
    pub segment: usize,
    pub departure_station: StationId,
    pub arrival_station: Option<StationId>,
    pub destination: Option<StationId>,
    /// Milliseconds
    pub delay: i64,
    pub standing: bool,
}

/// Output of the train system
#[derive(Debug, Clone, PartialEq)]
pub enum TrainEvent {
    Started { train: TrainId, cars: u32 },
    /// Car poses, ordered along the path
    Pose {
        train: TrainId,
        cars: Vec<PathSample>,
        standing: bool,
    },
    Status(TrainStatus),
    HandedOff { from: TrainId, to: TrainId },
    Stopped { train: TrainId, reason: StopReason },
}
