//! Runway spacing queue
//!
//! Flights sharing a runway key are ordered by base time and pushed back so
//! consecutive movements are at least the minimum interval apart.

use std::collections::BTreeMap;
use transit_core::{FlightId, Timestamp};

#[derive(Debug, Clone)]
pub struct SpacingQueue {
    min_interval: i64,
    groups: BTreeMap<String, Vec<(FlightId, Timestamp)>>,
}

impl SpacingQueue {
    pub fn new(min_interval: i64) -> Self {
        Self {
            min_interval: min_interval.max(0),
            groups: BTreeMap::new(),
        }
    }

    pub fn push(&mut self, runway: impl Into<String>, flight: FlightId, base: Timestamp) {
        self.groups.entry(runway.into()).or_default().push((flight, base));
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Delay (ms, possibly zero) for every queued flight.
    ///
    /// Each group is walked in base order (ties keep push order) and every
    /// flight is raised to at least the previous adjusted base plus the
    /// minimum interval.
    pub fn resolve(self) -> Vec<(FlightId, i64)> {
        let mut delays = Vec::with_capacity(self.len());
        for (_, mut group) in self.groups {
            group.sort_by_key(|(_, base)| *base);

            let mut latest: Option<Timestamp> = None;
            for (flight, base) in group {
                let earliest = latest.map_or(base, |l| base.max(l + self.min_interval));
                delays.push((flight, earliest - base));
                latest = Some(earliest);
            }
        }
        delays
    }
}
