//! Simulation context
//!
//! [`Simulation`] owns the frame scheduler and both entity registries. The
//! host calls [`Simulation::poll`] with its feed and [`Simulation::tick`]
//! once per frame, always passing the current time, and renders the
//! returned events. Nothing here reads the wall clock.

use crate::config::SimConfig;
use crate::feed::{FeedProvider, LiveSnapshot};
use crate::network::Network;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use transit_air::{FlightEvent, FlightInfo, FlightStopReason, FlightSystem};
use transit_core::{FlightId, LngLat, Result, Timestamp, TrainId, TransitError};
use transit_motion::PathSample;
use transit_rail::{TimetableEntry, TrainEvent, TrainPhase, TrainStatus, TrainSystem};
use transit_runtime::{
    DailyReload, EventBus, FrameScheduler, LiveRefresh, SimClock, SimSystem, SystemContext, TaskId,
    TaskOwners,
};

/// A simulated vehicle of either kind
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityId {
    Train(TrainId),
    Flight(FlightId),
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Train(id) => write!(f, "train {id}"),
            EntityId::Flight(id) => write!(f, "flight {id}"),
        }
    }
}

/// One car of an entity, as picked in the UI
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CarRef {
    pub entity: EntityId,
    pub car: u32,
}

/// Visible map bounds in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl Viewport {
    pub fn contains(&self, coord: LngLat, margin: f64) -> bool {
        coord.lng >= self.west - margin
            && coord.lng <= self.east + margin
            && coord.lat >= self.south - margin
            && coord.lat <= self.north + margin
    }
}

/// Output of the simulation, drained once per tick
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    Started {
        entity: EntityId,
        cars: u32,
    },
    /// One pose per car, ordered along the path
    Pose {
        entity: EntityId,
        cars: Vec<PathSample>,
        standing: bool,
    },
    Train(TrainStatus),
    Flight(FlightInfo),
    HandedOff {
        from: TrainId,
        to: TrainId,
    },
    /// `terminated` is false when the entity may start again
    Stopped {
        entity: EntityId,
        terminated: bool,
    },
}

pub struct Simulation {
    config: SimConfig,
    scheduler: FrameScheduler,
    clock: SimClock,
    trains: TrainSystem,
    train_owners: TaskOwners<TrainId>,
    train_events: EventBus<TrainEvent>,
    flights: FlightSystem,
    flight_owners: TaskOwners<FlightId>,
    flight_events: EventBus<FlightEvent>,
    output: EventBus<SimEvent>,
    live: LiveRefresh,
    daily: DailyReload,
    viewport: Option<Viewport>,
    /// Car count of every entity that may still be running or resume
    cars: HashMap<EntityId, u32>,
    marked: Option<CarRef>,
    tracked: Option<CarRef>,
}

impl Simulation {
    /// Build the registries. Fails only when the network has no valid path.
    pub fn new(config: SimConfig, network: &Network) -> Result<Self> {
        let built = network.build()?;
        let trains = TrainSystem::new(config.train_settings()?, config.clock.clone(), built.railways);
        let flights = FlightSystem::new(
            config.flight_settings()?,
            config.clock.clone(),
            config.runways.clone(),
            built.paths,
            built.airports,
        );

        Ok(Self {
            scheduler: FrameScheduler::with_default_frame_rate(config.runtime.frame_rate),
            clock: SimClock::with_stall_threshold(config.runtime.stall_threshold_ms),
            trains,
            train_owners: TaskOwners::new(),
            train_events: EventBus::new(),
            flights,
            flight_owners: TaskOwners::new(),
            flight_events: EventBus::new(),
            output: EventBus::new(),
            live: LiveRefresh::new(config.runtime.refresh_interval_ms, config.clock.precision_slack_ms),
            daily: DailyReload::new(),
            viewport: None,
            cars: HashMap::new(),
            marked: None,
            tracked: None,
            config,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn trains(&self) -> &TrainSystem {
        &self.trains
    }

    pub fn flights(&self) -> &FlightSystem {
        &self.flights
    }

    /// Entities currently standing or running
    pub fn active_count(&self) -> usize {
        self.trains.active_count() + self.flights.active_count()
    }

    pub fn marked(&self) -> Option<&CarRef> {
        self.marked.as_ref()
    }

    pub fn tracked(&self) -> Option<&CarRef> {
        self.tracked.as_ref()
    }

    pub fn mark(&mut self, car: Option<CarRef>) {
        self.marked = car;
    }

    pub fn track(&mut self, car: Option<CarRef>) {
        self.tracked = car;
    }

    /// Entities whose lead pose falls outside `viewport` run at the
    /// off-screen frame rate. `None` shows everything.
    pub fn set_viewport(&mut self, viewport: Option<Viewport>) {
        self.viewport = viewport;
        if viewport.is_none() {
            let tasks: Vec<TaskId> = self
                .train_owners
                .keys()
                .filter_map(|id| self.train_owners.task_of(id))
                .chain(self.flight_owners.keys().filter_map(|id| self.flight_owners.task_of(id)))
                .collect();
            for task in tasks {
                self.scheduler.set_frame_rate(task, None);
            }
        }
    }

    pub fn load_timetable(&mut self, entries: Vec<TimetableEntry>, now: Timestamp) {
        self.trains.load_timetable(entries, now);
    }

    /// Register one back-and-forth demo train per railway
    pub fn spawn_shuttles(&mut self) -> usize {
        self.trains.spawn_shuttles()
    }

    /// Run the polling cadence: reload the timetable once per service day,
    /// merge a live snapshot once per refresh interval, then start every
    /// entity whose window is open. Returns true if a poll ran.
    pub fn poll(&mut self, feed: &mut dyn FeedProvider, now: Timestamp) -> bool {
        self.observe_clock(now);
        if !self.live.is_due(now) {
            return false;
        }
        // A failed poll is retried on the next interval, not the next frame
        self.live.mark(now);

        self.reload_timetable(feed, now);
        match feed.live(now) {
            Ok(snapshot) => self.reconcile(&snapshot, now),
            Err(err) => tracing::warn!("Live poll of {} failed, keeping previous state: {}", feed.name(), err),
        }
        self.refresh(now);
        true
    }

    /// Merge a full live snapshot into both registries
    pub fn reconcile(&mut self, snapshot: &LiveSnapshot, now: Timestamp) {
        let reports = snapshot.live_trains();
        let notices = snapshot.notices();
        let mut ctx = SystemContext::new(now, &mut self.scheduler, &mut self.train_owners, &mut self.train_events);
        self.trains.reconcile(&reports, &notices, &mut ctx);

        match &snapshot.runways {
            Some(runways) => {
                let mut ctx =
                    SystemContext::new(now, &mut self.scheduler, &mut self.flight_owners, &mut self.flight_events);
                self.flights.reconcile(runways, &snapshot.flights, &mut ctx);
            }
            None if !snapshot.flights.is_empty() => {
                tracing::debug!("No runway report, keeping {} flights as they were", snapshot.flights.len());
            }
            None => {}
        }

        tracing::debug!(
            "Reconciled {} trains and {} flights",
            snapshot.trains.len(),
            snapshot.flights.len()
        );
        self.collect();
    }

    /// Start every entity whose activation window contains `now`
    pub fn refresh(&mut self, now: Timestamp) {
        let mut ctx = SystemContext::new(now, &mut self.scheduler, &mut self.train_owners, &mut self.train_events);
        self.trains.refresh(&mut ctx);
        let mut ctx = SystemContext::new(now, &mut self.scheduler, &mut self.flight_owners, &mut self.flight_events);
        self.flights.refresh(&mut ctx);
        self.collect();
    }

    /// Tear down every active entity. They resume on the next refresh, and
    /// the tick after this one sets a fresh stall baseline.
    pub fn reset(&mut self, now: Timestamp) {
        self.clock.reset();
        let mut ctx = SystemContext::new(now, &mut self.scheduler, &mut self.train_owners, &mut self.train_events);
        self.trains.stop_all(&mut ctx);
        let mut ctx = SystemContext::new(now, &mut self.scheduler, &mut self.flight_owners, &mut self.flight_events);
        self.flights.stop_all(&mut ctx);
        self.collect();
    }

    /// Advance every due task and drain the events produced since the
    /// previous tick.
    pub fn tick(&mut self, now: Timestamp) -> Vec<SimEvent> {
        self.observe_clock(now);

        for event in self.scheduler.tick(now) {
            let handled = {
                let mut ctx =
                    SystemContext::new(now, &mut self.scheduler, &mut self.train_owners, &mut self.train_events);
                ctx.dispatch(&mut self.trains, event)
            };
            if !handled {
                let mut ctx =
                    SystemContext::new(now, &mut self.scheduler, &mut self.flight_owners, &mut self.flight_events);
                ctx.dispatch(&mut self.flights, event);
            }
        }

        self.collect();
        self.output.drain()
    }

    fn observe_clock(&mut self, now: Timestamp) {
        if self.clock.advance(now) {
            tracing::warn!("No tick for {} ms, restarting every entity", self.clock.delta);
            self.reset(now);
            self.live.force();
        }
    }

    fn reload_timetable(&mut self, feed: &mut dyn FeedProvider, now: Timestamp) {
        let clock = &self.config.clock;
        let (day_start, day) = match (clock.service_day_start(now), clock.day_kind(now)) {
            (Ok(start), Ok(day)) => (start, day),
            (Err(err), _) | (_, Err(err)) => {
                tracing::warn!("Cannot place {} in a service day: {}", now, err);
                return;
            }
        };
        if !self.daily.is_due(day_start) {
            return;
        }

        match feed.timetable(day) {
            Ok(entries) => {
                tracing::info!("Loading {:?} timetable from {}", day, feed.name());
                self.trains.load_timetable(entries, now);
                self.daily.mark(day_start);
            }
            Err(err) => tracing::warn!("Timetable from {} unavailable: {}", feed.name(), err),
        }
    }

    fn collect(&mut self) {
        for event in self.train_events.drain() {
            self.on_train_event(event);
        }
        for event in self.flight_events.drain() {
            self.on_flight_event(event);
        }
    }

    fn on_train_event(&mut self, event: TrainEvent) {
        match event {
            TrainEvent::Started { train, cars } => self.started(EntityId::Train(train), cars),
            TrainEvent::Pose { train, cars, standing } => self.pose(EntityId::Train(train), cars, standing),
            TrainEvent::Status(status) => self.output.push(SimEvent::Train(status)),
            TrainEvent::HandedOff { from, to } => {
                let cars = self.cars.get(&EntityId::Train(to.clone())).copied().unwrap_or(0);
                self.retarget(&EntityId::Train(from.clone()), &EntityId::Train(to.clone()), cars);
                self.output.push(SimEvent::HandedOff { from, to });
            }
            TrainEvent::Stopped { train, reason } => {
                self.stopped(EntityId::Train(train), reason.phase() == TrainPhase::Inactive)
            }
        }
    }

    fn on_flight_event(&mut self, event: FlightEvent) {
        match event {
            FlightEvent::Started { flight } => self.started(EntityId::Flight(flight), 1),
            FlightEvent::Pose { flight, pose, standing } => {
                self.pose(EntityId::Flight(flight), vec![pose], standing)
            }
            FlightEvent::Status(info) => self.output.push(SimEvent::Flight(info)),
            FlightEvent::Stopped { flight, reason } => {
                self.stopped(EntityId::Flight(flight), reason != FlightStopReason::Completed)
            }
        }
    }

    fn started(&mut self, entity: EntityId, cars: u32) {
        if let Some(previous) = self.cars.insert(entity.clone(), cars) {
            if previous != cars {
                tracing::debug!("{} restarted with {} cars instead of {}", entity, cars, previous);
                self.release(&entity);
            }
        }
        self.output.push(SimEvent::Started { entity, cars });
    }

    fn pose(&mut self, entity: EntityId, cars: Vec<PathSample>, standing: bool) {
        if let Some(car) = cars.iter().position(|c| !c.is_finite()) {
            tracing::warn!(
                "{}",
                TransitError::NumericDegeneracy(format!("{entity} car {car} pose, frame skipped"))
            );
            return;
        }
        if let Some(lead) = cars.first() {
            self.throttle(&entity, lead.coord);
        }
        self.output.push(SimEvent::Pose {
            entity,
            cars,
            standing,
        });
    }

    fn stopped(&mut self, entity: EntityId, resumes: bool) {
        if !resumes {
            self.cars.remove(&entity);
            self.release(&entity);
        }
        self.output.push(SimEvent::Stopped {
            entity,
            terminated: !resumes,
        });
    }

    fn throttle(&mut self, entity: &EntityId, lead: LngLat) {
        let Some(viewport) = self.viewport else {
            return;
        };
        let runtime = &self.config.runtime;
        let hz = if viewport.contains(lead, runtime.viewport_margin_deg) {
            None
        } else {
            Some(runtime.offscreen_frame_rate)
        };
        let task = match entity {
            EntityId::Train(id) => self.train_owners.task_of(id),
            EntityId::Flight(id) => self.flight_owners.task_of(id),
        };
        if let Some(task) = task {
            self.scheduler.set_frame_rate(task, hz);
        }
    }

    /// Point references at `from` to the same car of `to`, dropping those
    /// whose car `to` does not have.
    fn retarget(&mut self, from: &EntityId, to: &EntityId, cars: u32) {
        for slot in [&mut self.marked, &mut self.tracked] {
            let Some(car) = slot.as_ref().filter(|c| &c.entity == from).map(|c| c.car) else {
                continue;
            };
            *slot = (car < cars).then(|| CarRef {
                entity: to.clone(),
                car,
            });
        }
    }

    fn release(&mut self, entity: &EntityId) {
        for slot in [&mut self.marked, &mut self.tracked] {
            if slot.as_ref().is_some_and(|c| &c.entity == entity) {
                *slot = None;
            }
        }
    }
}
