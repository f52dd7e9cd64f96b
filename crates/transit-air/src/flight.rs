//! Flight records, their live reports and derived timestamps

use crate::runway::runway_key;
use serde::{Deserialize, Serialize};
use transit_core::{FlightId, Result, RouteId, ServiceClock, Timestamp, TransitError};
use transit_motion::{MotionLimits, MotionProfile};

/// Operational status as published by the flight information feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlightStatus {
    NewTime,
    OnTime,
    Delayed,
    CheckIn,
    NowBoarding,
    BoardingComplete,
    Departed,
    Arrived,
    Cancelled,
    Diverted,
    #[serde(other)]
    Other,
}

impl FlightStatus {
    /// Statuses the feed reports before the actual time is known
    pub fn is_boarding_phase(self) -> bool {
        matches!(
            self,
            FlightStatus::CheckIn
                | FlightStatus::NowBoarding
                | FlightStatus::BoardingComplete
                | FlightStatus::Departed
        )
    }
}

/// One flight as reported by the arrival or departure feed.
///
/// Time fields are local `HH:MM` strings. Every poll replaces them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlightReport {
    pub id: FlightId,
    /// Flight number followed by code shares
    #[serde(default)]
    pub number: Vec<String>,
    #[serde(default)]
    pub airline: String,
    #[serde(default)]
    pub status: Option<FlightStatus>,
    #[serde(default)]
    pub departure_airport: Option<String>,
    #[serde(default)]
    pub arrival_airport: Option<String>,
    #[serde(default)]
    pub origin_airport: Option<String>,
    #[serde(default)]
    pub destination_airport: Option<String>,
    #[serde(default)]
    pub scheduled_departure: Option<String>,
    #[serde(default)]
    pub estimated_departure: Option<String>,
    #[serde(default)]
    pub actual_departure: Option<String>,
    #[serde(default)]
    pub scheduled_arrival: Option<String>,
    #[serde(default)]
    pub estimated_arrival: Option<String>,
    #[serde(default)]
    pub actual_arrival: Option<String>,
}

impl FlightReport {
    /// Best known departure: estimated, then actual, then scheduled
    pub fn departure_time(&self) -> Option<&str> {
        self.estimated_departure
            .as_deref()
            .or(self.actual_departure.as_deref())
            .or(self.scheduled_departure.as_deref())
    }

    pub fn arrival_time(&self) -> Option<&str> {
        self.estimated_arrival
            .as_deref()
            .or(self.actual_arrival.as_deref())
            .or(self.scheduled_arrival.as_deref())
    }
}

/// Whether the simulated leg is the takeoff or the approach
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Movement {
    Departure,
    Arrival,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightPhase {
    /// Waiting for its activation window
    Scheduled,
    /// At the gate or holding before the movement
    StandingBefore,
    Running,
    /// On the ground after landing, or gone after takeoff
    StandingAfter,
    Terminated,
}

impl FlightPhase {
    pub fn is_active(self) -> bool {
        matches!(
            self,
            FlightPhase::StandingBefore | FlightPhase::Running | FlightPhase::StandingAfter
        )
    }
}

/// Activation window of a flight.
///
/// `base` is the moment the spacing queue orders flights by: the takeoff
/// for departures, one standing duration before touchdown for arrivals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlightTimes {
    pub standing: Timestamp,
    pub start: Timestamp,
    pub base: Timestamp,
    pub end: Timestamp,
}

impl FlightTimes {
    pub fn shift(&mut self, delay: i64) {
        self.standing += delay;
        self.start += delay;
        self.base += delay;
        self.end += delay;
    }

    pub fn contains(&self, now: Timestamp) -> bool {
        self.standing <= now && now <= self.end
    }
}

#[derive(Debug, Clone)]
pub struct Flight {
    pub id: FlightId,
    pub report: FlightReport,
    pub route: RouteId,
    /// Spacing queue key
    pub runway: String,
    pub status: Option<FlightStatus>,
    pub movement: Movement,
    /// Set by the first successful `update`
    pub profile: Option<MotionProfile>,
    pub times: FlightTimes,
    pub phase: FlightPhase,
}

impl Flight {
    pub fn new(report: FlightReport, route: RouteId) -> Self {
        let runway = runway_key(route.as_str());
        Self {
            id: report.id.clone(),
            status: report.status,
            report,
            route,
            runway,
            movement: Movement::Departure,
            profile: None,
            times: FlightTimes {
                standing: 0,
                start: 0,
                base: 0,
                end: 0,
            },
            phase: FlightPhase::Scheduled,
        }
    }

    /// Replace the reported times and status with a fresh report. Identity
    /// fields (airports, route) stay as first seen.
    pub fn merge(&mut self, report: &FlightReport) {
        let current = &mut self.report;
        current.status = report.status;
        current.scheduled_departure = report.scheduled_departure.clone();
        current.estimated_departure = report.estimated_departure.clone();
        current.actual_departure = report.actual_departure.clone();
        current.scheduled_arrival = report.scheduled_arrival.clone();
        current.estimated_arrival = report.estimated_arrival.clone();
        current.actual_arrival = report.actual_arrival.clone();
        if !report.number.is_empty() {
            current.number = report.number.clone();
        }
    }

    /// Recompute the profile, timestamps and status from the report.
    ///
    /// A known departure makes a takeoff that starts at that time. Otherwise
    /// the flight is an approach at half speed that stops at the arrival time.
    pub fn update(
        &mut self,
        path_length: f64,
        limits: MotionLimits,
        standing: i64,
        clock: &ServiceClock,
        now: Timestamp,
    ) -> Result<()> {
        let resolve = |hhmm: Option<&str>| hhmm.map(|t| clock.time_of(t, now)).transpose();

        if let Some(departure) = resolve(self.report.departure_time())? {
            self.movement = Movement::Departure;
            let profile = MotionProfile::departure(path_length, limits);
            let duration = profile.duration().round() as i64;
            self.profile = Some(profile);
            self.times = FlightTimes {
                standing: departure - standing,
                start: departure,
                base: departure,
                end: departure + duration,
            };
        } else if let Some(arrival) = resolve(self.report.arrival_time())? {
            self.movement = Movement::Arrival;
            let profile = MotionProfile::arrival(path_length, limits.halved());
            let duration = profile.duration().round() as i64;
            self.profile = Some(profile);
            let start = arrival - duration;
            self.times = FlightTimes {
                standing: start,
                start,
                base: arrival - standing,
                end: arrival + standing,
            };
        } else {
            return Err(TransitError::ParseError(format!("flight {} has no time", self.id)));
        }

        self.status = derive_status(
            self.report.status,
            resolve(self.report.departure_time())?,
            resolve(self.report.scheduled_departure.as_deref())?,
            resolve(self.report.arrival_time())?,
            resolve(self.report.scheduled_arrival.as_deref())?,
        );
        Ok(())
    }
}

/// Fill in a status the feed left open by comparing the effective time to
/// the scheduled one. Arrivals are compared when no status is reported;
/// boarding-phase departures are refined the same way.
pub fn derive_status(
    reported: Option<FlightStatus>,
    departure: Option<Timestamp>,
    scheduled_departure: Option<Timestamp>,
    arrival: Option<Timestamp>,
    scheduled_arrival: Option<Timestamp>,
) -> Option<FlightStatus> {
    let compare = |actual: Option<Timestamp>, scheduled: Option<Timestamp>| {
        let (actual, scheduled) = (actual?, scheduled?);
        Some(match actual.cmp(&scheduled) {
            std::cmp::Ordering::Less => FlightStatus::NewTime,
            std::cmp::Ordering::Greater => FlightStatus::Delayed,
            std::cmp::Ordering::Equal => FlightStatus::OnTime,
        })
    };

    match reported {
        None => compare(arrival, scheduled_arrival),
        Some(status) if status.is_boarding_phase() => {
            compare(departure, scheduled_departure).or(Some(status))
        }
        Some(status) => Some(status),
    }
}
