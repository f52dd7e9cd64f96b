//! Runway decision table
//!
//! The tower reports which runways are in use for landing and departure.
//! That report selects a runway pattern, and the pattern together with the
//! side of the airport a flight approaches from selects the flight's route.
//! The table is configuration data; the defaults describe Haneda and Narita.

use serde::{Deserialize, Serialize};
use transit_core::RouteId;

/// Runways in use as reported by the tower
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunwayReport {
    #[serde(default)]
    pub landing: Vec<String>,
    #[serde(default)]
    pub departure: Vec<String>,
}

impl RunwayReport {
    pub fn new(landing: &[&str], departure: &[&str]) -> Self {
        Self {
            landing: landing.iter().map(|s| s.to_string()).collect(),
            departure: departure.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Canonical string used to detect pattern changes
    pub fn pattern(&self) -> String {
        format!("{} {}", self.landing.join("/"), self.departure.join("/"))
    }
}

/// Side of the airport a flight comes from or heads to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    #[default]
    #[serde(rename = "S")]
    South,
    #[serde(rename = "N")]
    North,
}

/// One route name per side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideRoutes {
    #[serde(rename = "S")]
    pub south: String,
    #[serde(rename = "N")]
    pub north: String,
}

impl SideRoutes {
    pub fn new(south: &str, north: &str) -> Self {
        Self {
            south: south.to_string(),
            north: north.to_string(),
        }
    }

    /// Same route for both sides
    pub fn both(route: &str) -> Self {
        Self::new(route, route)
    }

    pub fn get(&self, side: Side) -> &str {
        match side {
            Side::South => &self.south,
            Side::North => &self.north,
        }
    }
}

/// Runway pattern selected when every listed landing runway is in use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunwayPattern {
    pub landing: Vec<String>,
    pub arrival: SideRoutes,
    pub departure: SideRoutes,
    /// North wind operation
    pub north: bool,
}

/// Single-runway night operation: reported runway to route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NightRoute {
    pub runway: String,
    pub route: String,
    #[serde(default)]
    pub north: Option<bool>,
}

/// Runways of an airport whose operation only depends on the wind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindRunways {
    pub airport: String,
    /// Departure runway for south/north wind
    pub departure: WindPair,
    /// Arrival runway for south/north wind
    pub arrival: WindPair,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindPair {
    pub south: String,
    pub north: String,
}

impl WindPair {
    fn get(&self, north: bool) -> &str {
        if north {
            &self.north
        } else {
            &self.south
        }
    }
}

/// Routes in force for one runway report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunwayAssignment {
    pub arrival: Option<SideRoutes>,
    pub departure: Option<SideRoutes>,
    pub north: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunwayTable {
    /// Airport whose routes follow the reported pattern
    #[serde(default = "default_pattern_airport")]
    pub pattern_airport: String,
    /// Checked in order; the first match wins
    #[serde(default = "default_patterns")]
    pub patterns: Vec<RunwayPattern>,
    #[serde(default = "default_night_arrivals")]
    pub night_arrivals: Vec<NightRoute>,
    #[serde(default = "default_night_departures")]
    pub night_departures: Vec<NightRoute>,
    #[serde(default = "default_wind_airports")]
    pub wind_airports: Vec<WindRunways>,
}

fn default_pattern_airport() -> String {
    "HND".to_string()
}

fn default_patterns() -> Vec<RunwayPattern> {
    fn pattern(landing: &[&str], arrival: SideRoutes, departure: SideRoutes, north: bool) -> RunwayPattern {
        RunwayPattern {
            landing: landing.iter().map(|s| s.to_string()).collect(),
            arrival,
            departure,
            north,
        }
    }
    vec![
        // South wind, good weather
        pattern(&["L22", "L23"], SideRoutes::new("L23", "L22"), SideRoutes::new("16R", "16L"), false),
        // South wind, bad weather
        pattern(&["I22", "I23"], SideRoutes::new("I23", "I22"), SideRoutes::new("16R", "16L"), false),
        // North wind, good weather
        pattern(&["I34L", "H34R"], SideRoutes::new("IX34L", "H34R"), SideRoutes::new("05", "34R"), true),
        // North wind, bad weather
        pattern(&["I34L", "I34R"], SideRoutes::new("IZ34L", "H34R"), SideRoutes::new("05", "34R"), true),
    ]
}

fn default_night_arrivals() -> Vec<NightRoute> {
    let night = |runway: &str, route: &str, north| NightRoute {
        runway: runway.to_string(),
        route: route.to_string(),
        north: Some(north),
    };
    vec![
        night("I23", "IY23", false),
        night("L23", "LY23", false),
        night("I34L", "IX34L", true),
        night("I34R", "IY34R", true),
    ]
}

fn default_night_departures() -> Vec<NightRoute> {
    let night = |runway: &str, route: &str| NightRoute {
        runway: runway.to_string(),
        route: route.to_string(),
        north: None,
    };
    vec![night("16L", "N16L"), night("05", "N05")]
}

fn default_wind_airports() -> Vec<WindRunways> {
    vec![WindRunways {
        airport: "NRT".to_string(),
        departure: WindPair {
            south: "16R".to_string(),
            north: "34L".to_string(),
        },
        arrival: WindPair {
            south: "16L".to_string(),
            north: "34R".to_string(),
        },
    }]
}

impl Default for RunwayTable {
    fn default() -> Self {
        Self {
            pattern_airport: default_pattern_airport(),
            patterns: default_patterns(),
            night_arrivals: default_night_arrivals(),
            night_departures: default_night_departures(),
            wind_airports: default_wind_airports(),
        }
    }
}

impl RunwayTable {
    /// Routes in force for a runway report.
    ///
    /// A report matching no pattern with more than one landing runway is
    /// unexpected and yields no routes. A single landing runway is night
    /// operation, looked up runway by runway.
    pub fn resolve(&self, report: &RunwayReport) -> RunwayAssignment {
        if let Some(pattern) = self
            .patterns
            .iter()
            .find(|p| p.landing.iter().all(|r| report.landing.contains(r)))
        {
            return RunwayAssignment {
                arrival: Some(pattern.arrival.clone()),
                departure: Some(pattern.departure.clone()),
                north: pattern.north,
            };
        }

        let mut assignment = RunwayAssignment {
            arrival: None,
            departure: None,
            north: true,
        };
        if report.landing.len() != 1 {
            tracing::warn!("Unexpected runway configuration: {}", report.pattern());
            return assignment;
        }

        match self.night_arrivals.iter().find(|n| report.landing.contains(&n.runway)) {
            Some(night) => {
                assignment.arrival = Some(SideRoutes::both(&night.route));
                if let Some(north) = night.north {
                    assignment.north = north;
                }
            }
            None => tracing::warn!("Unexpected landing runway: {}", report.landing[0]),
        }
        match self.night_departures.iter().find(|n| report.departure.contains(&n.runway)) {
            Some(night) => assignment.departure = Some(SideRoutes::both(&night.route)),
            None => tracing::warn!("Unexpected departure runway: {}", report.departure.join("/")),
        }
        assignment
    }

    /// Route of a flight between two airports, or `None` if neither end is
    /// simulated or no route is in force.
    pub fn route(
        &self,
        assignment: &RunwayAssignment,
        departure_airport: Option<&str>,
        arrival_airport: Option<&str>,
        side: Side,
    ) -> Option<RouteId> {
        let wind = |airport: Option<&str>| {
            airport.and_then(|a| self.wind_airports.iter().find(|w| w.airport == a))
        };

        let route = if let Some(airport) = wind(departure_airport) {
            format!("{}.{}.Dep", airport.airport, airport.departure.get(assignment.north))
        } else if let Some(airport) = wind(arrival_airport) {
            format!("{}.{}.Arr", airport.airport, airport.arrival.get(assignment.north))
        } else if departure_airport == Some(self.pattern_airport.as_str()) {
            format!("{}.{}.Dep", self.pattern_airport, assignment.departure.as_ref()?.get(side))
        } else if arrival_airport == Some(self.pattern_airport.as_str()) {
            format!("{}.{}.Arr", self.pattern_airport, assignment.arrival.as_ref()?.get(side))
        } else {
            return None;
        };
        Some(RouteId::new(route))
    }
}

/// Spacing key of a route: the airport and the bare runway.
///
/// Approach prefixes are dropped so every procedure onto one runway shares
/// a key: `HND.IX34L.Arr` and `HND.H34L.Arr` both become `HND.34L`.
pub fn runway_key(route: &str) -> String {
    let mut parts = route.splitn(3, '.');
    let (Some(airport), Some(runway), Some(_)) = (parts.next(), parts.next(), parts.next()) else {
        return route.to_string();
    };
    if runway.is_empty() {
        return route.to_string();
    }
    let bare = runway.trim_start_matches(|c: char| c.is_ascii_uppercase());
    let bare = if bare.is_empty() {
        &runway[runway.len() - 1..]
    } else {
        bare
    };
    format!("{airport}.{bare}")
}
