//! Flight registry and lifecycle
//!
//! A flight stands at its first pose until its start time, runs its motion
//! profile along the route, then stands at the end of the route until its
//! end time. Every poll re-resolves routes from the runway report and
//! re-spaces the flights on each runway.

use crate::flight::{Flight, FlightPhase, FlightReport, FlightStatus};
use crate::runway::{RunwayAssignment, RunwayReport, RunwayTable, Side};
use crate::spacing::SpacingQueue;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use transit_core::{FlightId, RouteId, ServiceClock, Timestamp, TransitError};
use transit_motion::{sample, MotionLimits, Path, PathSample};
use transit_runtime::{SimSystem, SystemContext, TaskSpec};

pub type FlightContext<'a> = SystemContext<'a, FlightId, FlightEvent>;

#[derive(Debug, Clone)]
pub struct FlightSettings {
    /// Dwell before takeoff and after landing (ms)
    pub standing_duration: i64,
    pub limits: MotionLimits,
    /// Minimum gap between movements on one runway (ms)
    pub min_interval: i64,
}

/// Why a flight left the active set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightStopReason {
    Completed,
    /// The runway pattern changed under it
    PatternChanged,
    Reset,
}

/// UI-facing description of a flight
#[derive(Debug, Clone, PartialEq)]
pub struct FlightInfo {
    pub flight: FlightId,
    pub airline: String,
    pub number: Vec<String>,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub status: Option<FlightStatus>,
    pub route: RouteId,
    pub scheduled: Option<String>,
    pub estimated: Option<String>,
    pub actual: Option<String>,
    pub standing: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlightEvent {
    Started { flight: FlightId },
    Pose {
        flight: FlightId,
        pose: PathSample,
        standing: bool,
    },
    Status(FlightInfo),
    Stopped {
        flight: FlightId,
        reason: FlightStopReason,
    },
}

pub struct FlightSystem {
    settings: FlightSettings,
    clock: ServiceClock,
    table: RunwayTable,
    paths: HashMap<RouteId, Path>,
    /// Side of the pattern airport each remote airport lies on
    airports: HashMap<String, Side>,
    flights: BTreeMap<FlightId, Flight>,
    active: BTreeSet<FlightId>,
    pattern: Option<String>,
    pattern_changed: Option<Timestamp>,
}

impl FlightSystem {
    pub fn new(
        settings: FlightSettings,
        clock: ServiceClock,
        table: RunwayTable,
        paths: Vec<Path>,
        airports: HashMap<String, Side>,
    ) -> Self {
        Self {
            settings,
            clock,
            table,
            paths: paths.into_iter().map(|p| (p.id().clone(), p)).collect(),
            airports,
            flights: BTreeMap::new(),
            active: BTreeSet::new(),
            pattern: None,
            pattern_changed: None,
        }
    }

    pub fn flight(&self, id: &FlightId) -> Option<&Flight> {
        self.flights.get(id)
    }

    pub fn flights(&self) -> impl Iterator<Item = &Flight> {
        self.flights.values()
    }

    pub fn is_active(&self, id: &FlightId) -> bool {
        self.active.contains(id)
    }

    pub fn phase(&self, id: &FlightId) -> Option<FlightPhase> {
        self.flights.get(id).map(|f| f.phase)
    }

    /// Current runway pattern, once reported
    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_deref()
    }

    /// Merge a full flight snapshot taken under `runways`.
    pub fn reconcile(&mut self, runways: &RunwayReport, reports: &[FlightReport], ctx: &mut FlightContext<'_>) {
        let now = ctx.now;
        let pattern = runways.pattern();
        if self.pattern.as_ref() != Some(&pattern) {
            tracing::info!("Runway pattern: {}", pattern);
            self.pattern = Some(pattern);
            self.pattern_changed = Some(now);
            self.stop_active(FlightStopReason::PatternChanged, ctx);
        }

        let assignment = self.table.resolve(runways);
        let mut queued = BTreeSet::new();
        let mut seen = BTreeSet::new();
        for report in reports {
            if !seen.insert(report.id.clone()) {
                tracing::warn!(
                    "{}",
                    TransitError::ReconciliationConflict(format!(
                        "flight {} reported twice, using the later report",
                        report.id
                    ))
                );
            }
            if self.merge_report(report, &assignment, now) {
                queued.insert(report.id.clone());
            } else {
                queued.remove(&report.id);
            }
        }

        let mut queue = SpacingQueue::new(self.settings.min_interval);
        for id in &queued {
            if let Some(flight) = self.flights.get(id) {
                queue.push(flight.runway.clone(), id.clone(), flight.times.base);
            }
        }
        for (id, delay) in queue.resolve() {
            if delay > 0 {
                if let Some(flight) = self.flights.get_mut(&id) {
                    tracing::debug!("Flight {} spaced by {} ms", id, delay);
                    flight.times.shift(delay);
                }
            }
        }
        tracing::debug!("Reconciled {} flights, {} spaced", reports.len(), queued.len());
        self.prune(&seen, now);
    }

    /// Forget flights that left the snapshot and are done: completed, or
    /// idle past their end. Reported flights stay so they never restart.
    fn prune(&mut self, reported: &BTreeSet<FlightId>, now: Timestamp) {
        let before = self.flights.len();
        let active = &self.active;
        self.flights.retain(|id, flight| {
            active.contains(id)
                || reported.contains(id)
                || (flight.phase != FlightPhase::Terminated && now <= flight.times.end)
        });
        let dropped = before - self.flights.len();
        if dropped > 0 {
            tracing::debug!("Dropped {} finished flights", dropped);
        }
    }

    /// Register or update one flight. Returns true if it takes part in
    /// runway spacing.
    fn merge_report(&mut self, report: &FlightReport, assignment: &RunwayAssignment, now: Timestamp) -> bool {
        if !self.flights.contains_key(&report.id) {
            if report.status == Some(FlightStatus::Cancelled) {
                return false;
            }
            let side = report
                .destination_airport
                .as_ref()
                .or(report.origin_airport.as_ref())
                .and_then(|airport| self.airports.get(airport))
                .copied()
                .unwrap_or_default();
            let Some(route) = self.table.route(
                assignment,
                report.departure_airport.as_deref(),
                report.arrival_airport.as_deref(),
                side,
            ) else {
                return false;
            };
            if !self.paths.contains_key(&route) {
                tracing::debug!("Flight {}: no path for route {}", report.id, route);
                return false;
            }
            self.flights.insert(report.id.clone(), Flight::new(report.clone(), route));
        }

        let Some(flight) = self.flights.get_mut(&report.id) else {
            return false;
        };
        let Some(path) = self.paths.get(&flight.route) else {
            return false;
        };
        flight.merge(report);
        if let Err(err) = flight.update(
            path.total_length(),
            self.settings.limits,
            self.settings.standing_duration,
            &self.clock,
            now,
        ) {
            tracing::warn!("Flight {}: {}", report.id, err);
            return false;
        }

        // Flights scheduled under the previous pattern are left as they are
        !self.pattern_changed.is_some_and(|changed| flight.times.base < changed)
    }

    fn can_start(&self, flight: &Flight, now: Timestamp) -> bool {
        flight.phase == FlightPhase::Scheduled
            && flight.profile.is_some()
            && flight.times.contains(now)
            && !self.active.contains(&flight.id)
    }

    fn start(&mut self, id: &FlightId, ctx: &mut FlightContext<'_>) {
        let now = ctx.now;
        let Some(start) = self.flights.get(id).map(|f| f.times.start) else {
            return;
        };
        self.active.insert(id.clone());
        ctx.emit(FlightEvent::Started { flight: id.clone() });
        tracing::debug!("Flight {} started", id);

        if now >= start {
            self.run(id, (now - start) as f64, ctx);
        } else {
            self.set_phase(id, FlightPhase::StandingBefore);
            ctx.start_task(id.clone(), TaskSpec::timer((start - now) as f64));
            self.emit_pose(id, 0.0, true, ctx);
            self.emit_status(id, ctx);
        }
    }

    fn run(&mut self, id: &FlightId, elapsed: f64, ctx: &mut FlightContext<'_>) {
        let Some(profile) = self.flights.get(id).and_then(|f| f.profile) else {
            return;
        };
        self.set_phase(id, FlightPhase::Running);

        let mut spec = TaskSpec::timer(profile.duration());
        if elapsed > 0.0 {
            spec = spec.with_start_offset(elapsed);
        }
        ctx.start_task(id.clone(), spec);
        self.emit_status(id, ctx);
    }

    fn stop(&mut self, id: &FlightId, reason: FlightStopReason, ctx: &mut FlightContext<'_>) {
        ctx.stop_task(id);
        let was_active = self.active.remove(id);
        let phase = match reason {
            FlightStopReason::Completed => FlightPhase::Terminated,
            FlightStopReason::PatternChanged | FlightStopReason::Reset => FlightPhase::Scheduled,
        };
        self.set_phase(id, phase);
        if was_active {
            tracing::debug!("Flight {} stopped: {:?}", id, reason);
            ctx.emit(FlightEvent::Stopped {
                flight: id.clone(),
                reason,
            });
        }
    }

    fn stop_active(&mut self, reason: FlightStopReason, ctx: &mut FlightContext<'_>) {
        let ids: Vec<FlightId> = self.active.iter().cloned().collect();
        for id in ids {
            self.stop(&id, reason, ctx);
        }
    }

    fn set_phase(&mut self, id: &FlightId, phase: FlightPhase) {
        if let Some(flight) = self.flights.get_mut(id) {
            flight.phase = phase;
        }
    }

    fn emit_pose(&self, id: &FlightId, progress: f64, standing: bool, ctx: &mut FlightContext<'_>) {
        let Some(path) = self.flights.get(id).and_then(|f| self.paths.get(&f.route)) else {
            return;
        };
        match sample(path, progress * path.total_length(), 1, 0.0) {
            Ok(poses) => {
                if let Some(pose) = poses.into_iter().next() {
                    ctx.emit(FlightEvent::Pose {
                        flight: id.clone(),
                        pose,
                        standing,
                    });
                }
            }
            Err(err) => tracing::warn!("Flight {}: skipping pose: {}", id, err),
        }
    }

    fn emit_status(&self, id: &FlightId, ctx: &mut FlightContext<'_>) {
        let Some(flight) = self.flights.get(id) else {
            return;
        };
        let report = &flight.report;
        let departure = report.departure_airport.is_some() && report.scheduled_departure.is_some();
        let (scheduled, estimated, actual) = if departure {
            (&report.scheduled_departure, &report.estimated_departure, &report.actual_departure)
        } else {
            (&report.scheduled_arrival, &report.estimated_arrival, &report.actual_arrival)
        };
        ctx.emit(FlightEvent::Status(FlightInfo {
            flight: id.clone(),
            airline: report.airline.clone(),
            number: report.number.clone(),
            origin: report.origin_airport.clone(),
            destination: report.destination_airport.clone(),
            status: flight.status,
            route: flight.route.clone(),
            scheduled: scheduled.clone(),
            estimated: estimated.clone(),
            actual: actual.clone(),
            standing: flight.phase != FlightPhase::Running,
        }));
    }
}

impl SimSystem for FlightSystem {
    type Key = FlightId;
    type Event = FlightEvent;

    fn name(&self) -> &str {
        "flights"
    }

    fn refresh(&mut self, ctx: &mut FlightContext<'_>) {
        let now = ctx.now;
        let ready: Vec<FlightId> = self
            .flights
            .values()
            .filter(|f| self.can_start(f, now))
            .map(|f| f.id.clone())
            .collect();
        for id in ready {
            self.start(&id, ctx);
        }
    }

    fn on_frame(&mut self, key: &FlightId, elapsed: f64, _duration: f64, ctx: &mut FlightContext<'_>) {
        let Some(flight) = self.flights.get(key) else {
            return;
        };
        if flight.phase != FlightPhase::Running {
            return;
        }
        if let Some(profile) = flight.profile {
            self.emit_pose(key, profile.progress(elapsed), false, ctx);
        }
    }

    fn on_complete(&mut self, key: &FlightId, ctx: &mut FlightContext<'_>) {
        let now = ctx.now;
        let Some(flight) = self.flights.get(key) else {
            return;
        };
        match flight.phase {
            FlightPhase::StandingBefore => self.run(key, 0.0, ctx),
            FlightPhase::Running => {
                let dwell = (flight.times.end - now).max(0);
                self.set_phase(key, FlightPhase::StandingAfter);
                ctx.start_task(key.clone(), TaskSpec::timer(dwell as f64));
                self.emit_pose(key, 1.0, true, ctx);
                self.emit_status(key, ctx);
            }
            FlightPhase::StandingAfter => self.stop(key, FlightStopReason::Completed, ctx),
            FlightPhase::Scheduled | FlightPhase::Terminated => {}
        }
    }

    fn stop_all(&mut self, ctx: &mut FlightContext<'_>) {
        self.stop_active(FlightStopReason::Reset, ctx);
    }

    fn active_count(&self) -> usize {
        self.active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transit_core::time::{MINUTE, SECOND};
    use transit_core::LngLat;
    use transit_runtime::{EventBus, FrameScheduler, TaskOwners};

    /// 2026-10-19 12:00 JST
    const NOON: Timestamp = 1_792_378_800_000;

    struct Harness {
        system: FlightSystem,
        sched: FrameScheduler,
        owners: TaskOwners<FlightId>,
        bus: EventBus<FlightEvent>,
    }

    fn corridor(id: &str, length_deg: f64) -> Path {
        Path::new(
            id,
            vec![LngLat::new(139.78, 35.55), LngLat::new(139.78 + length_deg, 35.55)],
        )
        .unwrap()
    }

    impl Harness {
        fn new() -> Self {
            let settings = FlightSettings {
                standing_duration: MINUTE,
                limits: MotionLimits::from_kmh(500.0, 12.0).unwrap(),
                min_interval: 90 * SECOND,
            };
            let clock = ServiceClock {
                precision_slack_ms: 0,
                ..ServiceClock::default()
            };
            let paths = vec![
                corridor("HND.16R.Dep", 0.04),
                corridor("HND.L22.Arr", 0.2),
                corridor("HND.H34R.Arr", 0.2),
            ];
            let airports = HashMap::from([("CTS".to_string(), Side::North)]);
            Self {
                system: FlightSystem::new(settings, clock, RunwayTable::default(), paths, airports),
                sched: FrameScheduler::new(),
                owners: TaskOwners::new(),
                bus: EventBus::new(),
            }
        }

        fn reconcile(&mut self, now: Timestamp, runways: &RunwayReport, reports: &[FlightReport]) {
            let mut ctx = SystemContext::new(now, &mut self.sched, &mut self.owners, &mut self.bus);
            self.system.reconcile(runways, reports, &mut ctx);
        }

        fn refresh(&mut self, now: Timestamp) {
            let mut ctx = SystemContext::new(now, &mut self.sched, &mut self.owners, &mut self.bus);
            self.system.refresh(&mut ctx);
        }

        fn step(&mut self, now: Timestamp) -> Timestamp {
            for t in [now, now + 10 * MINUTE] {
                for event in self.sched.tick(t) {
                    let mut ctx = SystemContext::new(t, &mut self.sched, &mut self.owners, &mut self.bus);
                    ctx.dispatch(&mut self.system, event);
                }
            }
            now + 10 * MINUTE
        }
    }

    fn south() -> RunwayReport {
        RunwayReport::new(&["L22", "L23"], &["16L", "16R"])
    }

    fn departure(id: &str, time: &str) -> FlightReport {
        FlightReport {
            id: id.into(),
            number: vec![id.to_string()],
            airline: "JAL".into(),
            departure_airport: Some("HND".into()),
            arrival_airport: Some("ITM".into()),
            destination_airport: Some("ITM".into()),
            scheduled_departure: Some(time.into()),
            ..FlightReport::default()
        }
    }

    #[test]
    fn departure_lifecycle() {
        let mut h = Harness::new();
        let now = NOON - 30 * SECOND;
        h.reconcile(now, &south(), &[departure("JL1", "12:00")]);
        h.refresh(now);

        let id = FlightId::from("JL1");
        assert_eq!(h.system.phase(&id), Some(FlightPhase::StandingBefore));

        let now = h.step(now);
        assert_eq!(h.system.phase(&id), Some(FlightPhase::Running));
        let now = h.step(now);
        assert_eq!(h.system.phase(&id), Some(FlightPhase::StandingAfter));
        h.step(now);
        assert_eq!(h.system.phase(&id), Some(FlightPhase::Terminated));
        assert!(h.bus.drain().contains(&FlightEvent::Stopped {
            flight: id,
            reason: FlightStopReason::Completed
        }));
        assert!(h.sched.is_empty());
    }

    #[test]
    fn departures_on_one_runway_are_spaced() {
        let mut h = Harness::new();
        let now = NOON - 10 * MINUTE;
        h.reconcile(
            now,
            &south(),
            &[departure("JL1", "12:00"), departure("NH2", "12:01")],
        );

        let first = h.system.flight(&"JL1".into()).unwrap();
        let second = h.system.flight(&"NH2".into()).unwrap();
        assert_eq!(first.route, RouteId::from("HND.16R.Dep"));
        assert_eq!(first.runway, "HND.16R");
        assert_eq!(first.times.base, NOON);
        assert_eq!(second.times.base, NOON + 90 * SECOND);
        assert_eq!(second.times.standing, NOON + 30 * SECOND);
    }

    #[test]
    fn arrival_route_follows_origin_side() {
        let mut h = Harness::new();
        let report = FlightReport {
            id: "NH60".into(),
            departure_airport: Some("CTS".into()),
            arrival_airport: Some("HND".into()),
            origin_airport: Some("CTS".into()),
            scheduled_arrival: Some("12:30".into()),
            ..FlightReport::default()
        };
        h.reconcile(NOON, &south(), &[report]);

        let flight = h.system.flight(&"NH60".into()).unwrap();
        assert_eq!(flight.route, RouteId::from("HND.L22.Arr"));
        assert_eq!(flight.runway, "HND.22");
        assert_eq!(flight.status, Some(FlightStatus::OnTime));
        assert_eq!(flight.times.end, NOON + 31 * MINUTE);
    }

    #[test]
    fn pattern_change_stops_active_flights() {
        let mut h = Harness::new();
        let now = NOON - 30 * SECOND;
        h.reconcile(now, &south(), &[departure("JL1", "12:00")]);
        h.refresh(now);
        assert_eq!(h.system.active_count(), 1);

        let north = RunwayReport::new(&["I34L", "H34R"], &["05", "34R"]);
        h.reconcile(now, &north, &[departure("JL1", "12:00")]);
        assert_eq!(h.system.active_count(), 0);
        assert_eq!(h.system.pattern(), Some("I34L/H34R 05/34R"));
        assert!(h.bus.drain().contains(&FlightEvent::Stopped {
            flight: "JL1".into(),
            reason: FlightStopReason::PatternChanged
        }));
        assert_eq!(h.system.phase(&"JL1".into()), Some(FlightPhase::Scheduled));
    }

    #[test]
    fn finished_flights_leave_the_registry() {
        let mut h = Harness::new();
        let now = NOON - 30 * SECOND;
        h.reconcile(now, &south(), &[departure("JL1", "12:00"), departure("NH2", "14:00")]);
        h.refresh(now);
        assert_eq!(h.system.flights().count(), 2);

        let now = h.step(now);
        let now = h.step(now);
        h.step(now);
        assert_eq!(h.system.phase(&"JL1".into()), Some(FlightPhase::Terminated));

        // Still in the feed, so it stays finished instead of restarting
        h.reconcile(NOON + 20 * MINUTE, &south(), &[departure("JL1", "12:00")]);
        h.refresh(NOON + 20 * MINUTE);
        assert_eq!(h.system.phase(&"JL1".into()), Some(FlightPhase::Terminated));
        assert!(!h.system.is_active(&"JL1".into()));

        h.reconcile(NOON + 30 * MINUTE, &south(), &[]);
        assert!(h.system.flight(&"JL1".into()).is_none());
        assert!(h.system.flight(&"NH2".into()).is_some());

        // Dropped out of the feed and never started before its end
        h.reconcile(NOON + 180 * MINUTE, &south(), &[]);
        assert_eq!(h.system.flights().count(), 0);
    }

    #[test]
    fn unroutable_and_cancelled_flights_are_ignored() {
        let mut h = Harness::new();
        let mut cancelled = departure("JL9", "12:00");
        cancelled.status = Some(FlightStatus::Cancelled);
        let elsewhere = FlightReport {
            departure_airport: Some("KIX".into()),
            arrival_airport: Some("ITM".into()),
            ..departure("XX1", "12:00")
        };
        h.reconcile(NOON, &south(), &[cancelled, elsewhere]);
        assert_eq!(h.system.flights().count(), 0);
    }
}
