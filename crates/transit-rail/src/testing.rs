//! Shared fixtures for unit tests

use crate::railway::Railway;
use transit_core::{LngLat, StationId};
use transit_motion::Path;

/// Four stations, the last one repeating the first
pub fn loop_line() -> Railway {
    let path = Path::new(
        "Loop",
        vec![
            LngLat::new(139.70, 35.68),
            LngLat::new(139.72, 35.68),
            LngLat::new(139.72, 35.70),
            LngLat::new(139.70, 35.70),
        ],
    )
    .unwrap();
    let stations = ["A", "B", "C", "A"].map(StationId::from).to_vec();
    Railway::new("Loop".into(), path, stations, vec![0.0, 1000.0, 2000.0, 3000.0], "Outer", 4)
        .unwrap()
}

/// Three stations on a straight east-west line, 2 km apart
pub fn line() -> Railway {
    let path = Path::new(
        "Line",
        vec![LngLat::new(139.70, 35.68), LngLat::new(139.75, 35.68)],
    )
    .unwrap();
    let stations = ["X", "Y", "Z"].map(StationId::from).to_vec();
    Railway::new("Line".into(), path, stations, vec![0.0, 2000.0, 4000.0], "East", 2).unwrap()
}

/// 2026-10-19 (a Monday) at `h:m` JST
pub fn jst(h: u32, m: u32) -> transit_core::Timestamp {
    use chrono::TimeZone;
    chrono::FixedOffset::east_opt(9 * 3600)
        .unwrap()
        .with_ymd_and_hms(2026, 10, 19, h, m, 0)
        .unwrap()
        .timestamp_millis()
}
