//! Transit Runtime - Simulation loop infrastructure
//!
//! Provides the building blocks every simulated entity runs on:
//! - `FrameScheduler` - duration-bounded, frame-rate-limited tasks ticked by the host
//! - `SimClock` - tick bookkeeping with stall detection
//! - `LiveRefresh` / `DailyReload` - polling and reload cadences
//! - `EventBus` - typed output queue drained by the host
//! - `SimSystem` - trait for entity registries driven by scheduler tasks

mod cadence;
mod clock;
mod event_bus;
mod scheduler;
mod system;

pub use cadence::{DailyReload, LiveRefresh};
pub use clock::{SimClock, DEFAULT_STALL_THRESHOLD};
pub use event_bus::EventBus;
pub use scheduler::{
    CompleteCallback, FrameCallback, FrameScheduler, TaskEvent, TaskId, TaskSpec,
    DEFAULT_FRAME_RATE,
};
pub use system::{SimSystem, SystemContext, TaskOwners};
