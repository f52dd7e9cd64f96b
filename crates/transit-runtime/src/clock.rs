//! Simulation clock with stall detection

use transit_core::Timestamp;

/// Gap between ticks after which the host is considered to have stalled
pub const DEFAULT_STALL_THRESHOLD: i64 = 10_000;

/// Tracks host ticks. Time is always supplied by the caller so the engine
/// stays deterministic under replay.
pub struct SimClock {
    /// Timestamp of the latest tick
    pub now: Timestamp,
    /// Milliseconds since the previous tick
    pub delta: i64,
    /// Gap (ms) that counts as a stall
    pub stall_threshold: i64,
    first_tick: bool,
}

impl Default for SimClock {
    fn default() -> Self {
        Self {
            now: 0,
            delta: 0,
            stall_threshold: DEFAULT_STALL_THRESHOLD,
            first_tick: true,
        }
    }
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stall_threshold(ms: i64) -> Self {
        Self {
            stall_threshold: ms,
            ..Self::default()
        }
    }

    /// Advance to `now`. Returns true if the gap since the previous tick
    /// reached the stall threshold (a suspended tab, a paused debugger).
    pub fn advance(&mut self, now: Timestamp) -> bool {
        if self.first_tick {
            self.first_tick = false;
            self.now = now;
            self.delta = 0;
            return false;
        }

        self.delta = now - self.now;
        self.now = now;
        self.delta >= self.stall_threshold
    }

    /// Forget the previous tick; the next advance reports no stall.
    pub fn reset(&mut self) {
        self.first_tick = true;
        self.delta = 0;
    }
}
