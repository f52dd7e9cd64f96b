//! Transit Core - Foundational types for the transit simulation
//!
//! This crate provides the types that all other transit crates depend on:
//! - Identifier newtypes (`TrainId`, `FlightId`, `RailwayId`, ...)
//! - `LngLat` and spherical-earth geodesy
//! - `ServiceClock` - timetable `HH:MM` strings to absolute timestamps
//! - Error types and Result alias

mod error;
pub mod geo;
mod id;
pub mod time;

pub use error::{Result, TransitError};
pub use geo::LngLat;
pub use id::{FlightId, RailwayId, RouteId, StationId, TrainId};
pub use time::{DayKind, ServiceClock, Timestamp};
