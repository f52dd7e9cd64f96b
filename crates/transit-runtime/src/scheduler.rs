//! Frame scheduler - time-based tasks ticked once per host frame
//!
//! A task runs for a fixed duration (or forever) and is invoked at most
//! `frame_rate` times per second. Each invocation reports how far into the
//! task the clock is, clamped to its duration. When the duration elapses the
//! completion callback fires exactly once and the task is removed.

use std::collections::BTreeMap;
use std::fmt;
use transit_core::Timestamp;

/// Per-frame callback: `(elapsed_ms, duration_ms)`
pub type FrameCallback = Box<dyn FnMut(f64, f64)>;

/// Called once when a task's duration has elapsed
pub type CompleteCallback = Box<dyn FnOnce()>;

/// Default frame rate of a task in Hz
pub const DEFAULT_FRAME_RATE: f64 = 120.0;

/// Handle of a scheduled task. Never reused within one scheduler.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct TaskId(u64);

impl TaskId {
    #[cfg(test)]
    pub(crate) fn from_raw(id: u64) -> Self {
        Self(id)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskId({})", self.0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Options for a new task. Build with the `with_*`/`on_*` methods.
pub struct TaskSpec {
    /// Task length in milliseconds; infinite tasks never complete on their own
    pub duration: f64,
    /// Frame rate override in Hz
    pub frame_rate: Option<f64>,
    /// Milliseconds the task clock is already advanced by when scheduled
    pub start_offset: Option<f64>,
    pub on_frame: Option<FrameCallback>,
    pub on_complete: Option<CompleteCallback>,
}

impl TaskSpec {
    pub fn new() -> Self {
        Self {
            duration: f64::INFINITY,
            frame_rate: None,
            start_offset: None,
            on_frame: None,
            on_complete: None,
        }
    }

    /// A callback-less task that only reports completion after `duration` ms
    pub fn timer(duration: f64) -> Self {
        Self::new().with_duration(duration)
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_frame_rate(mut self, hz: f64) -> Self {
        self.frame_rate = Some(hz);
        self
    }

    pub fn with_start_offset(mut self, offset: f64) -> Self {
        self.start_offset = Some(offset);
        self
    }

    pub fn on_frame(mut self, callback: impl FnMut(f64, f64) + 'static) -> Self {
        self.on_frame = Some(Box::new(callback));
        self
    }

    pub fn on_complete(mut self, callback: impl FnOnce() + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }
}

impl Default for TaskSpec {
    fn default() -> Self {
        Self::new()
    }
}

/// What happened to a task during a tick, in task-id order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TaskEvent {
    /// The task was invoked with `elapsed` clamped to `duration`
    Frame {
        id: TaskId,
        elapsed: f64,
        duration: f64,
    },
    /// The task's duration has elapsed; it has been removed
    Completed { id: TaskId },
}

struct Task {
    duration: f64,
    frame_rate: Option<f64>,
    /// Clock origin; pinned on the first tick unless a start offset was given
    start: Option<f64>,
    next_frame: f64,
    on_frame: Option<FrameCallback>,
    on_complete: Option<CompleteCallback>,
}

/// Registry of live tasks, driven by [`FrameScheduler::tick`].
pub struct FrameScheduler {
    tasks: BTreeMap<TaskId, Task>,
    next_id: u64,
    default_frame_rate: f64,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::with_default_frame_rate(DEFAULT_FRAME_RATE)
    }

    pub fn with_default_frame_rate(hz: f64) -> Self {
        Self {
            tasks: BTreeMap::new(),
            next_id: 0,
            default_frame_rate: if hz > 0.0 { hz } else { DEFAULT_FRAME_RATE },
        }
    }

    /// Register a task. A positive start offset backdates the task clock so
    /// the first frame already reports that much elapsed time.
    pub fn schedule(&mut self, spec: TaskSpec, now: Timestamp) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;

        let start = spec
            .start_offset
            .filter(|offset| *offset > 0.0)
            .map(|offset| now as f64 - offset);

        self.tasks.insert(
            id,
            Task {
                duration: if spec.duration.is_nan() { 0.0 } else { spec.duration },
                frame_rate: spec.frame_rate,
                start,
                next_frame: f64::NEG_INFINITY,
                on_frame: spec.on_frame,
                on_complete: spec.on_complete,
            },
        );
        id
    }

    /// Remove a task without running its completion callback. Returns false
    /// if the task had already completed or been cancelled.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        self.tasks.remove(&id).is_some()
    }

    /// Lower or restore a task's frame rate (`None` restores the default).
    pub fn set_frame_rate(&mut self, id: TaskId, hz: Option<f64>) {
        if let Some(task) = self.tasks.get_mut(&id) {
            task.frame_rate = hz;
        }
    }

    pub fn frame_rate(&self, id: TaskId) -> Option<f64> {
        self.tasks
            .get(&id)
            .map(|task| task.frame_rate.unwrap_or(self.default_frame_rate))
    }

    pub fn is_live(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    /// Elapsed time of a live task, or `None` if it hasn't ticked yet.
    pub fn elapsed(&self, id: TaskId, now: Timestamp) -> Option<f64> {
        let task = self.tasks.get(&id)?;
        task.start.map(|start| (now as f64 - start).max(0.0))
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Drop every task without running completion callbacks.
    pub fn clear(&mut self) {
        self.tasks.clear();
    }

    /// Run every task whose next frame is due.
    pub fn tick(&mut self, now: Timestamp) -> Vec<TaskEvent> {
        let now_f = now as f64;
        let mut events = Vec::new();
        let ids: Vec<TaskId> = self.tasks.keys().copied().collect();

        for id in ids {
            let Some(task) = self.tasks.get_mut(&id) else {
                continue;
            };
            if task.next_frame > now_f {
                continue;
            }

            let start = *task.start.get_or_insert(now_f);
            let elapsed = (now_f - start).max(0.0);
            let duration = task.duration;
            let shown = elapsed.min(duration);

            if let Some(callback) = task.on_frame.as_mut() {
                callback(shown, duration);
            }
            events.push(TaskEvent::Frame {
                id,
                elapsed: shown,
                duration,
            });

            let hz = match task.frame_rate {
                Some(hz) if hz > 0.0 && hz.is_finite() => hz,
                _ => self.default_frame_rate,
            };
            task.next_frame = now_f + 1000.0 / hz;

            if elapsed >= duration {
                if let Some(task) = self.tasks.remove(&id) {
                    if let Some(complete) = task.on_complete {
                        complete();
                    }
                }
                events.push(TaskEvent::Completed { id });
            }
        }

        events
    }
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[test]
    fn frame_reports_elapsed_clamped_to_duration() {
        let mut sched = FrameScheduler::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        sched.schedule(
            TaskSpec::new()
                .with_duration(100.0)
                .on_frame(move |elapsed, duration| sink.borrow_mut().push((elapsed, duration))),
            0,
        );

        sched.tick(1000);
        sched.tick(1050);
        sched.tick(1500);

        assert_eq!(*seen.borrow(), vec![(0.0, 100.0), (50.0, 100.0), (100.0, 100.0)]);
        assert!(sched.is_empty());
    }

    #[test]
    fn completion_fires_exactly_once() {
        let mut sched = FrameScheduler::new();
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        let id = sched.schedule(TaskSpec::timer(10.0).on_complete(move || c.set(c.get() + 1)), 0);

        sched.tick(0);
        let events = sched.tick(20);
        sched.tick(40);

        assert_eq!(count.get(), 1);
        assert!(events.contains(&TaskEvent::Completed { id }));
        assert!(!sched.is_live(id));
    }

    #[test]
    fn frame_rate_throttles_invocations() {
        let mut sched = FrameScheduler::new();
        let id = sched.schedule(TaskSpec::new().with_frame_rate(1.0), 0);

        assert_eq!(sched.tick(0).len(), 1);
        assert!(sched.tick(500).is_empty());
        assert_eq!(sched.tick(1000).len(), 1);

        sched.set_frame_rate(id, None);
        assert_eq!(sched.frame_rate(id), Some(DEFAULT_FRAME_RATE));
        assert!(sched.tick(1005).is_empty());
        assert_eq!(sched.tick(1009).len(), 1);
    }

    #[test]
    fn infinite_task_never_completes() {
        let mut sched = FrameScheduler::new();
        let id = sched.schedule(TaskSpec::new(), 0);
        for t in 0..100 {
            for event in sched.tick(t * 1_000_000) {
                assert!(!matches!(event, TaskEvent::Completed { .. }));
            }
        }
        assert!(sched.is_live(id));
    }

    #[test]
    fn start_offset_backdates_clock() {
        let mut sched = FrameScheduler::new();
        let id = sched.schedule(TaskSpec::timer(10_000.0).with_start_offset(4_000.0), 50_000);
        let events = sched.tick(50_000);
        assert_eq!(
            events[0],
            TaskEvent::Frame {
                id,
                elapsed: 4_000.0,
                duration: 10_000.0
            }
        );
        let events = sched.tick(56_000);
        assert!(events.contains(&TaskEvent::Completed { id }));
    }

    #[test]
    fn cancel_is_idempotent_and_silences_task() {
        let mut sched = FrameScheduler::new();
        let fired = Rc::new(Cell::new(false));
        let f = fired.clone();
        let id = sched.schedule(TaskSpec::timer(5.0).on_complete(move || f.set(true)), 0);

        assert!(sched.cancel(id));
        assert!(!sched.cancel(id));
        assert!(!sched.cancel(TaskId::from_raw(999)));
        assert!(sched.tick(100).is_empty());
        assert!(!fired.get());
    }

    #[test]
    fn missing_callbacks_are_no_ops() {
        let mut sched = FrameScheduler::new();
        let id = sched.schedule(TaskSpec::timer(0.0), 0);
        let events = sched.tick(0);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], TaskEvent::Completed { id });
    }

    #[test]
    fn ids_are_unique() {
        let mut sched = FrameScheduler::new();
        let a = sched.schedule(TaskSpec::new(), 0);
        sched.cancel(a);
        let b = sched.schedule(TaskSpec::new(), 0);
        assert_ne!(a, b);
    }
}
