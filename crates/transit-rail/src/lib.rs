//! Transit Rail - Timetable-driven train simulation
//!
//! - `Railway` - station list, offsets along the path, direction naming
//! - `TimetableEntry` / `Train` - published timetable and linked train records
//! - `LivePatch` - typed live-data overrides
//! - `TrainSystem` - the train lifecycle, a `SimSystem` for the runtime

pub mod patch;
pub mod railway;
pub mod system;
pub mod timetable;
pub mod train;

#[cfg(test)]
mod testing;

pub use patch::{LivePatch, LiveTrain};
pub use railway::{Direction, Railway, RailwayNotice};
pub use system::{TrainContext, TrainSettings, TrainSystem};
pub use timetable::{link_timetable, StopTime, TimetableEntry, Train, TrainKind, TrainPhase};
pub use train::{ActiveTrain, Section, StopReason, TrainEvent, TrainStatus};
