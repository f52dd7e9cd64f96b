//! Simulation system trait and the context it runs in

use crate::event_bus::EventBus;
use crate::scheduler::{FrameScheduler, TaskEvent, TaskId, TaskSpec};
use bimap::BiMap;
use std::fmt;
use std::hash::Hash;
use transit_core::Timestamp;

/// One-to-one mapping between live scheduler tasks and the entities that
/// own them. An entity owns at most one task at a time.
pub struct TaskOwners<K: Eq + Hash> {
    map: BiMap<TaskId, K>,
}

impl<K: Eq + Hash> Default for TaskOwners<K> {
    fn default() -> Self {
        Self { map: BiMap::new() }
    }
}

impl<K: Eq + Hash> TaskOwners<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, task: TaskId, key: K) {
        self.map.insert(task, key);
    }

    pub fn owner(&self, task: TaskId) -> Option<&K> {
        self.map.get_by_left(&task)
    }

    pub fn task_of(&self, key: &K) -> Option<TaskId> {
        self.map.get_by_right(key).copied()
    }

    pub fn remove_task(&mut self, task: TaskId) -> Option<K> {
        self.map.remove_by_left(&task).map(|(_, key)| key)
    }

    pub fn remove_key(&mut self, key: &K) -> Option<TaskId> {
        self.map.remove_by_right(key).map(|(task, _)| task)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.map.right_values()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}

/// Everything a system may touch during one call: the scheduler, its own
/// task ownership table, its output bus and the current time.
pub struct SystemContext<'a, K: Eq + Hash, E> {
    pub now: Timestamp,
    scheduler: &'a mut FrameScheduler,
    owners: &'a mut TaskOwners<K>,
    events: &'a mut EventBus<E>,
}

impl<'a, K: Eq + Hash + Clone + fmt::Debug, E> SystemContext<'a, K, E> {
    pub fn new(
        now: Timestamp,
        scheduler: &'a mut FrameScheduler,
        owners: &'a mut TaskOwners<K>,
        events: &'a mut EventBus<E>,
    ) -> Self {
        Self {
            now,
            scheduler,
            owners,
            events,
        }
    }

    /// Schedule a task for `key`, cancelling any task it already owns.
    pub fn start_task(&mut self, key: K, spec: TaskSpec) -> TaskId {
        self.stop_task(&key);
        let task = self.scheduler.schedule(spec, self.now);
        self.owners.insert(task, key);
        task
    }

    /// Cancel the task owned by `key`. Returns false if it owned none.
    pub fn stop_task(&mut self, key: &K) -> bool {
        match self.owners.remove_key(key) {
            Some(task) => {
                self.scheduler.cancel(task);
                true
            }
            None => false,
        }
    }

    pub fn has_task(&self, key: &K) -> bool {
        self.owners.task_of(key).is_some()
    }

    pub fn set_frame_rate(&mut self, key: &K, hz: Option<f64>) {
        if let Some(task) = self.owners.task_of(key) {
            self.scheduler.set_frame_rate(task, hz);
        }
    }

    pub fn emit(&mut self, event: E) {
        self.events.push(event);
    }

    /// Route a scheduler event to the system owning its task. Returns false
    /// if the task belongs to another system (or was already stopped).
    pub fn dispatch<S>(&mut self, system: &mut S, event: TaskEvent) -> bool
    where
        S: SimSystem<Key = K, Event = E>,
    {
        match event {
            TaskEvent::Frame {
                id,
                elapsed,
                duration,
            } => {
                let Some(key) = self.owners.owner(id).cloned() else {
                    return false;
                };
                system.on_frame(&key, elapsed, duration, self);
                true
            }
            TaskEvent::Completed { id } => {
                let Some(key) = self.owners.remove_task(id) else {
                    return false;
                };
                system.on_complete(&key, self);
                true
            }
        }
    }
}

/// A registry of simulated entities driven by scheduler tasks.
///
/// State transitions happen in `on_complete` (a section or dwell finished)
/// and `refresh` (activation windows opened). `on_frame` only turns progress
/// into output events and must not change lifecycle state.
pub trait SimSystem {
    type Key: Clone + Eq + Hash + fmt::Debug;
    type Event;

    /// Human-readable name for this system
    fn name(&self) -> &str;

    /// Start every entity whose activation window contains `ctx.now`
    fn refresh(&mut self, ctx: &mut SystemContext<'_, Self::Key, Self::Event>);

    /// A frame of the task owned by `key` ran
    fn on_frame(
        &mut self,
        key: &Self::Key,
        elapsed: f64,
        duration: f64,
        ctx: &mut SystemContext<'_, Self::Key, Self::Event>,
    );

    /// The task owned by `key` finished; its ownership is already released
    fn on_complete(&mut self, key: &Self::Key, ctx: &mut SystemContext<'_, Self::Key, Self::Event>);

    /// Tear down every active entity
    fn stop_all(&mut self, ctx: &mut SystemContext<'_, Self::Key, Self::Event>);

    /// Number of entities currently standing or running
    fn active_count(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts down `remaining` legs per entity, one timer per leg.
    #[derive(Default)]
    struct Legs {
        remaining: std::collections::HashMap<&'static str, u32>,
        frames: u32,
    }

    impl SimSystem for Legs {
        type Key = &'static str;
        type Event = String;

        fn name(&self) -> &str {
            "legs"
        }

        fn refresh(&mut self, ctx: &mut SystemContext<'_, &'static str, String>) {
            let keys: Vec<_> = self.remaining.keys().copied().collect();
            for key in keys {
                if !ctx.has_task(&key) {
                    ctx.start_task(key, TaskSpec::timer(100.0));
                }
            }
        }

        fn on_frame(
            &mut self,
            _key: &&'static str,
            _elapsed: f64,
            _duration: f64,
            _ctx: &mut SystemContext<'_, &'static str, String>,
        ) {
            self.frames += 1;
        }

        fn on_complete(&mut self, key: &&'static str, ctx: &mut SystemContext<'_, &'static str, String>) {
            let left = self.remaining.get_mut(key).map(|n| {
                *n -= 1;
                *n
            });
            match left {
                Some(0) | None => {
                    self.remaining.remove(key);
                    ctx.emit(format!("{key} done"));
                }
                Some(_) => {
                    ctx.start_task(*key, TaskSpec::timer(100.0));
                }
            }
        }

        fn stop_all(&mut self, ctx: &mut SystemContext<'_, &'static str, String>) {
            for key in self.remaining.keys() {
                ctx.stop_task(key);
            }
        }

        fn active_count(&self) -> usize {
            self.remaining.len()
        }
    }

    fn run(
        system: &mut Legs,
        sched: &mut FrameScheduler,
        owners: &mut TaskOwners<&'static str>,
        bus: &mut EventBus<String>,
        now: Timestamp,
    ) {
        for event in sched.tick(now) {
            let mut ctx = SystemContext::new(now, sched, owners, bus);
            ctx.dispatch(system, event);
        }
    }

    #[test]
    fn dispatch_drives_legs_to_completion() {
        let mut system = Legs::default();
        system.remaining.insert("a", 2);
        let mut sched = FrameScheduler::new();
        let mut owners = TaskOwners::new();
        let mut bus = EventBus::new();

        system.refresh(&mut SystemContext::new(0, &mut sched, &mut owners, &mut bus));
        run(&mut system, &mut sched, &mut owners, &mut bus, 0);
        run(&mut system, &mut sched, &mut owners, &mut bus, 100);
        assert_eq!(owners.len(), 1);
        run(&mut system, &mut sched, &mut owners, &mut bus, 100);
        run(&mut system, &mut sched, &mut owners, &mut bus, 200);

        assert_eq!(bus.drain(), vec!["a done".to_string()]);
        assert!(owners.is_empty());
        assert!(sched.is_empty());
        assert_eq!(system.active_count(), 0);
        assert!(system.frames >= 4);
    }

    #[test]
    fn restarting_replaces_previous_task() {
        let mut sched = FrameScheduler::new();
        let mut owners: TaskOwners<&'static str> = TaskOwners::new();
        let mut bus: EventBus<String> = EventBus::new();
        let mut ctx = SystemContext::new(0, &mut sched, &mut owners, &mut bus);

        let first = ctx.start_task("a", TaskSpec::new());
        let second = ctx.start_task("a", TaskSpec::new());
        assert_ne!(first, second);
        assert!(ctx.stop_task(&"a"));
        assert!(!ctx.stop_task(&"a"));
        assert!(sched.is_empty());
    }

    #[test]
    fn foreign_tasks_are_ignored() {
        let mut system = Legs::default();
        let mut sched = FrameScheduler::new();
        let mut owners = TaskOwners::new();
        let mut bus = EventBus::new();
        sched.schedule(TaskSpec::timer(0.0), 0);

        for event in sched.tick(0) {
            let mut ctx = SystemContext::new(0, &mut sched, &mut owners, &mut bus);
            assert!(!ctx.dispatch(&mut system, event));
        }
        assert_eq!(system.frames, 0);
    }
}
