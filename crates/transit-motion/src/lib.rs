//! Transit Motion - where a vehicle is, given how far it has travelled
//!
//! - `Path` - vertex list with a cumulative distance/bearing/grade table
//! - `sample` - distance to per-car pose via binary search and forward projection
//! - `MotionProfile` - trapezoidal progress-vs-time curves for trains and flights

pub mod path;
pub mod profile;
pub mod sampler;

pub use path::{Path, PathNode};
pub use profile::{MotionLimits, MotionProfile, ProfileShape};
pub use sampler::{sample, PathSample};
