//! Railways: a path plus the stations placed along it

use serde::{Deserialize, Serialize};
use transit_core::{RailwayId, Result, StationId, TransitError};
use transit_motion::Path;

/// Default spacing between consecutive cars in meters
pub const DEFAULT_CAR_SPACING: f64 = 20.0;

/// Travel direction relative to the station list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    pub fn sign(self) -> i32 {
        match self {
            Direction::Ascending => 1,
            Direction::Descending => -1,
        }
    }

    pub fn reversed(self) -> Self {
        match self {
            Direction::Ascending => Direction::Descending,
            Direction::Descending => Direction::Ascending,
        }
    }
}

/// Disruption reported for a whole railway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RailwayNotice {
    Suspended,
    Turnback,
    Cancelled,
    Delayed,
}

impl RailwayNotice {
    /// Notice named by an operator's free-text train information status.
    /// Statuses that name none of them (normal service) yield `None`.
    pub fn from_status_text(text: &str) -> Option<Self> {
        [
            ("見合わせ", RailwayNotice::Suspended),
            ("折返し運転", RailwayNotice::Turnback),
            ("運休", RailwayNotice::Cancelled),
            ("遅延", RailwayNotice::Delayed),
        ]
        .into_iter()
        .find(|(keyword, _)| text.contains(keyword))
        .map(|(_, notice)| notice)
    }
}

#[derive(Debug, Clone)]
pub struct Railway {
    pub id: RailwayId,
    pub stations: Vec<StationId>,
    /// Distance of each station from the start of the path in meters
    pub station_offsets: Vec<f64>,
    /// Feed name of the direction in which station indices increase
    pub ascending: String,
    pub car_composition: u32,
    pub car_spacing: f64,
    pub path: Path,
    /// Current disruption, reset on every poll
    pub notice: Option<RailwayNotice>,
}

impl Railway {
    pub fn new(
        id: RailwayId,
        path: Path,
        stations: Vec<StationId>,
        station_offsets: Vec<f64>,
        ascending: impl Into<String>,
        car_composition: u32,
    ) -> Result<Self> {
        if stations.len() < 2 {
            return Err(TransitError::malformed_path(
                id.as_str(),
                "a railway needs at least two stations",
            ));
        }
        if stations.len() != station_offsets.len() {
            return Err(TransitError::malformed_path(
                id.as_str(),
                format!(
                    "{} stations but {} offsets",
                    stations.len(),
                    station_offsets.len()
                ),
            ));
        }
        if station_offsets.iter().any(|o| !o.is_finite()) {
            return Err(TransitError::malformed_path(id.as_str(), "non-finite station offset"));
        }

        Ok(Self {
            id,
            stations,
            station_offsets,
            ascending: ascending.into(),
            car_composition: car_composition.max(1),
            car_spacing: DEFAULT_CAR_SPACING,
            path,
            notice: None,
        })
    }

    pub fn with_car_spacing(mut self, spacing: f64) -> Self {
        if spacing.is_finite() && spacing >= 0.0 {
            self.car_spacing = spacing;
        }
        self
    }

    pub fn station_count(&self) -> usize {
        self.stations.len()
    }

    /// Station at `index` along the path
    pub fn station(&self, index: usize) -> Result<&StationId> {
        self.stations.get(index).ok_or_else(|| {
            TransitError::UnknownRoute(format!("railway {} has no station {}", self.id, index))
        })
    }

    /// Direction of a feed direction name
    pub fn direction_of(&self, name: &str) -> Direction {
        if name == self.ascending {
            Direction::Ascending
        } else {
            Direction::Descending
        }
    }

    pub fn offset(&self, index: usize) -> Option<f64> {
        self.station_offsets.get(index).copied()
    }

    /// Index of `station` searching in travel direction.
    ///
    /// Loop lines list their first station twice, so ascending trains take
    /// the first match at or after `from` and descending trains the last
    /// match at or before it.
    pub fn find_station(
        &self,
        station: &StationId,
        direction: Direction,
        from: Option<usize>,
    ) -> Option<usize> {
        match direction {
            Direction::Ascending => {
                let from = from.unwrap_or(0);
                self.stations
                    .iter()
                    .skip(from)
                    .position(|s| s == station)
                    .map(|i| i + from)
            }
            Direction::Descending => {
                let end = self.stations.len().checked_sub(1)?;
                let last = from.unwrap_or(end).min(end);
                self.stations[..=last].iter().rposition(|s| s == station)
            }
        }
    }

    pub fn is_disrupted(&self) -> bool {
        self.notice.is_some()
    }
}
