//! Transit Sim - The simulation context and its host-facing surface
//!
//! - `Simulation` - owns the scheduler and both registries, turns their
//!   output into `SimEvent`s and keeps UI car references alive
//! - `SimConfig` - layered TOML configuration
//! - `Network` - path, railway and airport records
//! - `FeedProvider` - timetable and live snapshot source
//! - `Scenario` / `ReplayFeed` - recorded data for offline runs

pub mod config;
pub mod engine;
pub mod feed;
pub mod logging;
pub mod network;
pub mod scenario;

pub use config::SimConfig;
pub use engine::{CarRef, EntityId, SimEvent, Simulation, Viewport};
pub use feed::{FeedProvider, LiveSnapshot, RailwayStatus, TrainReport};
pub use logging::init_logging;
pub use network::{BuiltNetwork, Network, PathRecord, RailwayRecord};
pub use scenario::{ReplayFeed, Scenario, TimedSnapshot, Timetables};
