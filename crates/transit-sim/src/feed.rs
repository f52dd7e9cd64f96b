//! Feed records and the provider seam
//!
//! Providers hand over parsed records only. Fetching and parsing the
//! operators' formats happens outside the simulation.

use serde::{Deserialize, Serialize};
use transit_air::{FlightReport, RunwayReport};
use transit_core::time::SECOND;
use transit_core::{DayKind, RailwayId, Result, StationId, Timestamp, TrainId};
use transit_rail::{LivePatch, LiveTrain, RailwayNotice, TimetableEntry};

/// One train in a live snapshot, as the feed reports it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainReport {
    pub id: TrainId,
    pub railway: RailwayId,
    pub direction: String,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub train_type: Option<String>,
    /// Seconds
    #[serde(default)]
    pub delay: Option<i64>,
    #[serde(default)]
    pub car_composition: Option<u32>,
    #[serde(default)]
    pub origin: Option<StationId>,
    #[serde(default)]
    pub destination: Option<StationId>,
    #[serde(default)]
    pub from_station: Option<StationId>,
    #[serde(default)]
    pub to_station: Option<StationId>,
}

impl TrainReport {
    pub fn to_live(&self) -> LiveTrain {
        LiveTrain {
            id: self.id.clone(),
            railway: self.railway.clone(),
            direction: self.direction.clone(),
            number: self.number.clone(),
            from_station: self.from_station.clone(),
            to_station: self.to_station.clone(),
            patch: LivePatch {
                delay: self.delay.map(|s| s * SECOND),
                car_composition: self.car_composition,
                train_type: self.train_type.clone(),
                origin: self.origin.clone(),
                destination: self.destination.clone(),
            },
        }
    }
}

/// Train information for one railway. Feeds either name the notice or pass
/// the operator's status text through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RailwayStatus {
    pub railway: RailwayId,
    #[serde(default)]
    pub notice: Option<RailwayNotice>,
    #[serde(default)]
    pub text: Option<String>,
}

impl RailwayStatus {
    pub fn notice(&self) -> Option<RailwayNotice> {
        self.notice
            .or_else(|| self.text.as_deref().and_then(RailwayNotice::from_status_text))
    }
}

/// Full-replace snapshot of one poll
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveSnapshot {
    #[serde(default)]
    pub trains: Vec<TrainReport>,
    #[serde(default)]
    pub railway_status: Vec<RailwayStatus>,
    /// Absent when the tower report could not be fetched
    #[serde(default)]
    pub runways: Option<RunwayReport>,
    #[serde(default)]
    pub flights: Vec<FlightReport>,
}

impl LiveSnapshot {
    pub fn live_trains(&self) -> Vec<LiveTrain> {
        self.trains.iter().map(TrainReport::to_live).collect()
    }

    pub fn notices(&self) -> Vec<(RailwayId, RailwayNotice)> {
        self.railway_status
            .iter()
            .filter_map(|s| Some((s.railway.clone(), s.notice()?)))
            .collect()
    }
}

/// Source of timetables and live snapshots.
///
/// A failing call returns `TransitError::FeedUnavailable`; the simulation
/// keeps running on the data it already has.
pub trait FeedProvider {
    /// Human-readable name for this provider
    fn name(&self) -> &str;

    /// Timetable of the service day variant
    fn timetable(&mut self, day: DayKind) -> Result<Vec<TimetableEntry>>;

    /// Latest live snapshot as of `now`
    fn live(&mut self, now: Timestamp) -> Result<LiveSnapshot>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snapshot_from_json() {
        let snapshot: LiveSnapshot = serde_json::from_value(json!({
            "trains": [{
                "id": "Line.101",
                "railway": "Line",
                "direction": "East",
                "delay": 90,
                "car_composition": 8,
                "destination": "Y"
            }],
            "railway_status": [{ "railway": "Line", "notice": "suspended" }],
            "runways": { "landing": ["L22"], "departure": ["16R"] }
        }))
        .unwrap();

        assert!(snapshot.flights.is_empty());
        assert_eq!(snapshot.runways.as_ref().unwrap().pattern(), "L22 16R");
        assert_eq!(snapshot.notices(), vec![(RailwayId::from("Line"), RailwayNotice::Suspended)]);

        let live = &snapshot.live_trains()[0];
        assert_eq!(live.patch.delay, Some(90_000));
        assert_eq!(live.patch.car_composition, Some(8));
        assert_eq!(live.patch.destination, Some(StationId::from("Y")));
        assert_eq!(live.patch.origin, None);
    }

    #[test]
    fn notices_from_status_text() {
        let snapshot: LiveSnapshot = serde_json::from_value(json!({
            "railway_status": [
                { "railway": "Line", "text": "運転見合わせ" },
                { "railway": "Loop", "text": "平常運転" },
                { "railway": "Ring", "notice": "delayed", "text": "運休" }
            ]
        }))
        .unwrap();
        assert_eq!(
            snapshot.notices(),
            vec![
                (RailwayId::from("Line"), RailwayNotice::Suspended),
                (RailwayId::from("Ring"), RailwayNotice::Delayed),
            ]
        );
    }

    #[test]
    fn missing_delay_is_not_reported() {
        let report = TrainReport {
            id: "T".into(),
            railway: "Line".into(),
            direction: "East".into(),
            ..TrainReport::default()
        };
        assert_eq!(report.to_live().patch, LivePatch::default());
    }
}
