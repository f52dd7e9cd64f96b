//! Transit Air - Flight simulation around a runway spacing queue
//!
//! - `RunwayTable` - runway report to route decision table
//! - `Flight` - reported flight, derived profile and activation window
//! - `SpacingQueue` - minimum interval between movements on one runway
//! - `FlightSystem` - the flight lifecycle, a `SimSystem` for the runtime

pub mod flight;
pub mod runway;
pub mod spacing;
pub mod system;

pub use flight::{derive_status, Flight, FlightPhase, FlightReport, FlightStatus, FlightTimes, Movement};
pub use runway::{runway_key, RunwayAssignment, RunwayPattern, RunwayReport, RunwayTable, Side, SideRoutes};
pub use spacing::SpacingQueue;
pub use system::{FlightContext, FlightEvent, FlightInfo, FlightSettings, FlightStopReason, FlightSystem};
