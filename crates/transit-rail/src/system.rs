//! Train registry and lifecycle transitions
//!
//! Every active train owns exactly one scheduler task: a timed dwell while
//! standing or a motion profile while running. When the task completes,
//! [`TrainSystem::advance`] picks the next state from the train's kind and
//! phase. Live reports are merged in [`TrainSystem::reconcile`]; a train
//! whose motion-shaping data changed is torn down and restarted fresh by the
//! following refresh.

use crate::patch::LiveTrain;
use crate::railway::{Direction, Railway, RailwayNotice};
use crate::timetable::{link_timetable, TimetableEntry, Train, TrainKind, TrainPhase};
use crate::train::{
    resolve_ad_hoc, resolve_timetabled, ActiveTrain, Resolution, Section, StopReason, TrainEvent,
    TrainStatus,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use transit_core::{RailwayId, ServiceClock, Timestamp, TrainId, TransitError};
use transit_motion::{sample, MotionLimits, MotionProfile};
use transit_runtime::{SimSystem, SystemContext, TaskSpec};

pub type TrainContext<'a> = SystemContext<'a, TrainId, TrainEvent>;

/// Tunables of the train lifecycle
#[derive(Debug, Clone)]
pub struct TrainSettings {
    /// How long before its first departure a train appears (ms)
    pub standing_duration: i64,
    /// Shortest dwell at any stop (ms)
    pub min_standing_duration: i64,
    /// Dwell of ad hoc trains between re-evaluations (ms)
    pub ad_hoc_standing_duration: i64,
    /// Measurement latency allowed below a timetabled section time (ms)
    pub precision_slack: f64,
    /// Lateness allowed above a timetabled section time (ms)
    pub schedule_tolerance: f64,
    pub limits: MotionLimits,
    /// Limits of fast-forwarded shuttle trains
    pub shuttle_limits: MotionLimits,
    /// Dwell of shuttle trains (ms)
    pub shuttle_dwell: f64,
    /// How long an unreported ad hoc train is kept (ms)
    pub ad_hoc_retention: i64,
}

pub struct TrainSystem {
    settings: TrainSettings,
    clock: ServiceClock,
    railways: HashMap<RailwayId, Railway>,
    trains: BTreeMap<TrainId, Train>,
    active: BTreeMap<TrainId, ActiveTrain>,
    /// Registry keys reported by the latest live snapshot
    reported: HashSet<TrainId>,
}

impl TrainSystem {
    pub fn new(settings: TrainSettings, clock: ServiceClock, railways: Vec<Railway>) -> Self {
        Self {
            settings,
            clock,
            railways: railways.into_iter().map(|r| (r.id.clone(), r)).collect(),
            trains: BTreeMap::new(),
            active: BTreeMap::new(),
            reported: HashSet::new(),
        }
    }

    pub fn railway(&self, id: &RailwayId) -> Option<&Railway> {
        self.railways.get(id)
    }

    pub fn railways(&self) -> impl Iterator<Item = &Railway> {
        self.railways.values()
    }

    pub fn train(&self, id: &TrainId) -> Option<&Train> {
        self.trains.get(id)
    }

    pub fn trains(&self) -> impl Iterator<Item = &Train> {
        self.trains.values()
    }

    pub fn active(&self, id: &TrainId) -> Option<&ActiveTrain> {
        self.active.get(id)
    }

    pub fn is_active(&self, id: &TrainId) -> bool {
        self.active.contains_key(id)
    }

    pub fn phase(&self, id: &TrainId) -> TrainPhase {
        self.trains.get(id).map_or(TrainPhase::Inactive, |t| t.phase)
    }

    pub fn clock(&self) -> &ServiceClock {
        &self.clock
    }

    /// Replace the timetabled trains. Live-only trains are kept, and trains
    /// that are running right now carry their phase and delay over. Every
    /// other record starts the new day inactive and on time.
    pub fn load_timetable(&mut self, entries: Vec<TimetableEntry>, now: Timestamp) {
        let mut trains = link_timetable(
            entries,
            &self.railways,
            &self.clock,
            self.settings.standing_duration,
            now,
        );

        for (id, old) in std::mem::take(&mut self.trains) {
            match trains.get_mut(&id) {
                Some(new) if old.kind == TrainKind::Timetabled => {
                    if self.active.contains_key(&id) {
                        new.phase = old.phase;
                        new.delay = old.delay;
                    }
                }
                Some(_) => {
                    tracing::warn!(
                        "{}",
                        TransitError::ReconciliationConflict(format!(
                            "timetable now lists live-only train {id}"
                        ))
                    );
                }
                None if old.kind != TrainKind::Timetabled => {
                    trains.insert(id, old);
                }
                None => {}
            }
        }

        tracing::info!("Loaded timetable: {} trains", trains.len());
        self.trains = trains;
    }

    /// Register one shuttle train per railway. They start on the next refresh.
    pub fn spawn_shuttles(&mut self) -> usize {
        let mut ids: Vec<&RailwayId> = self.railways.keys().collect();
        ids.sort();

        let mut spawned = 0;
        for railway_id in ids {
            let railway = &self.railways[railway_id];
            let id = TrainId::new(format!("{}.Shuttle", railway.id));
            self.trains.insert(
                id.clone(),
                Train {
                    id,
                    railway: railway.id.clone(),
                    kind: TrainKind::Shuttle,
                    phase: TrainPhase::Inactive,
                    direction: Direction::Ascending,
                    train_type: None,
                    number: None,
                    stops: Vec::new(),
                    origin: railway.stations.first().cloned(),
                    destination: railway.stations.last().cloned(),
                    previous: None,
                    next: None,
                    start: i64::MIN,
                    end: i64::MAX,
                    delay: 0,
                    car_composition: railway.car_composition,
                    from_station: None,
                    to_station: None,
                    last_seen: None,
                },
            );
            spawned += 1;
        }
        tracing::info!("Spawned {} shuttle trains", spawned);
        spawned
    }

    /// Merge a full live snapshot: train reports plus railway notices.
    pub fn reconcile(
        &mut self,
        reports: &[LiveTrain],
        notices: &[(RailwayId, RailwayNotice)],
        ctx: &mut TrainContext<'_>,
    ) {
        self.reported.clear();
        for report in reports {
            self.reconcile_one(report, ctx);
        }
        self.expire_ad_hoc(ctx);
        self.apply_notices(notices, ctx);
    }

    fn reconcile_one(&mut self, report: &LiveTrain, ctx: &mut TrainContext<'_>) {
        let now = ctx.now;
        let timetabled = self
            .trains
            .get(&report.id)
            .is_some_and(|t| t.kind == TrainKind::Timetabled);
        let key = if timetabled {
            report.id.clone()
        } else {
            report.id.ad_hoc()
        };

        if !self.reported.insert(key.clone()) {
            tracing::warn!(
                "{}",
                TransitError::ReconciliationConflict(format!(
                    "train {} reported twice, using the later report",
                    report.id
                ))
            );
        }

        let restart = match self.trains.get_mut(&key) {
            Some(train) => {
                let changed = report.patch.apply(train);
                if changed && train.kind == TrainKind::Timetabled {
                    if let Err(err) =
                        train.update_window(&self.clock, self.settings.standing_duration, now)
                    {
                        tracing::warn!("Train {}: {}", key, err);
                    }
                }
                if train.kind == TrainKind::AdHoc {
                    train.from_station = report.from_station.clone();
                    train.to_station = report.to_station.clone();
                    train.last_seen = Some(now);
                    train.end = now + self.settings.ad_hoc_retention;
                }
                changed && train.phase.is_active()
            }
            None => {
                self.register_ad_hoc(key.clone(), report, now);
                false
            }
        };

        if restart {
            tracing::debug!("Train {} changed live, restarting", key);
            self.stop_train(&key, StopReason::Reconciled, ctx);
        }
    }

    fn register_ad_hoc(&mut self, key: TrainId, report: &LiveTrain, now: Timestamp) {
        let Some(railway) = self.railways.get(&report.railway) else {
            tracing::warn!(
                "Ignoring live train {}: {}",
                report.id,
                TransitError::UnknownRoute(report.railway.to_string())
            );
            return;
        };

        let patch = &report.patch;
        let train = Train {
            id: key.clone(),
            railway: railway.id.clone(),
            kind: TrainKind::AdHoc,
            phase: TrainPhase::Inactive,
            direction: railway.direction_of(&report.direction),
            train_type: patch.train_type.clone(),
            number: report.number.clone(),
            stops: Vec::new(),
            origin: patch.origin.clone(),
            destination: patch.destination.clone(),
            previous: None,
            next: None,
            start: now,
            end: now + self.settings.ad_hoc_retention,
            delay: patch.delay.unwrap_or(0).max(0),
            car_composition: patch
                .car_composition
                .filter(|c| *c > 0)
                .unwrap_or(railway.car_composition),
            from_station: report.from_station.clone(),
            to_station: report.to_station.clone(),
            last_seen: Some(now),
        };
        tracing::debug!("Registered ad hoc train {}", key);
        self.trains.insert(key, train);
    }

    fn expire_ad_hoc(&mut self, ctx: &mut TrainContext<'_>) {
        let now = ctx.now;
        let retention = self.settings.ad_hoc_retention;
        let expired: Vec<TrainId> = self
            .trains
            .values()
            .filter(|t| t.kind == TrainKind::AdHoc)
            .filter(|t| t.last_seen.map_or(true, |seen| now - seen >= retention))
            .map(|t| t.id.clone())
            .collect();

        for id in expired {
            tracing::debug!("Ad hoc train {} expired", id);
            self.stop_train(&id, StopReason::Expired, ctx);
            self.trains.remove(&id);
        }
    }

    fn apply_notices(&mut self, notices: &[(RailwayId, RailwayNotice)], ctx: &mut TrainContext<'_>) {
        for railway in self.railways.values_mut() {
            railway.notice = None;
        }
        for (id, notice) in notices {
            match self.railways.get_mut(id) {
                Some(railway) => railway.notice = Some(*notice),
                None => tracing::warn!("Notice for unknown railway {}", id),
            }
        }

        let suspended: Vec<TrainId> = self
            .active
            .keys()
            .filter(|id| !self.reported.contains(*id))
            .filter(|id| {
                self.trains.get(*id).is_some_and(|t| {
                    t.kind != TrainKind::Shuttle
                        && self.railways.get(&t.railway).is_some_and(Railway::is_disrupted)
                })
            })
            .cloned()
            .collect();
        for id in suspended {
            tracing::debug!("Train {} suspended", id);
            self.stop_train(&id, StopReason::Suspended, ctx);
        }
    }

    fn can_activate(&self, train: &Train, now: Timestamp) -> bool {
        if train.phase != TrainPhase::Inactive {
            return false;
        }
        if train.kind == TrainKind::Shuttle {
            return true;
        }
        let linked_active = |link: &Option<TrainId>| link.as_ref().is_some_and(|id| self.is_active(id));
        train.in_window(now)
            && !linked_active(&train.previous)
            && !linked_active(&train.next)
            && self
                .railways
                .get(&train.railway)
                .is_some_and(|r| !r.is_disrupted() || self.reported.contains(&train.id))
    }

    /// Absolute time of a timetable string plus the train's delay
    fn scheduled(&self, train: &Train, hhmm: Option<&str>, now: Timestamp) -> Option<Timestamp> {
        match self.clock.time_of(hhmm?, now) {
            Ok(time) => Some(time + train.delay),
            Err(err) => {
                tracing::warn!("Train {}: {}", train.id, err);
                None
            }
        }
    }

    /// Activate a train at stop `index` (or wherever the clock puts it).
    /// Returns false if the train has no section to serve.
    pub fn start(&mut self, id: &TrainId, index: Option<usize>, ctx: &mut TrainContext<'_>) -> bool {
        let now = ctx.now;
        let Some(train) = self.trains.get(id) else {
            return false;
        };
        let Some(railway) = self.railways.get(&train.railway) else {
            tracing::warn!("Train {}: {}", id, TransitError::UnknownRoute(train.railway.to_string()));
            return false;
        };

        let section = match train.kind {
            TrainKind::Timetabled => {
                match resolve_timetabled(train, railway, index, &self.clock, now) {
                    Some(Resolution::Section(section)) => section,
                    _ => return false,
                }
            }
            TrainKind::AdHoc => match resolve_ad_hoc(train, railway, None, false) {
                Some(section) => section,
                None => return false,
            },
            TrainKind::Shuttle => match railway.station(0) {
                Ok(first) => Section {
                    timetable_index: None,
                    index: 0,
                    length: 1,
                    departure_station: first.clone(),
                    departure_time: None,
                    arrival_station: railway.stations.get(1).cloned(),
                    arrival_time: None,
                },
                Err(err) => {
                    tracing::warn!("Train {}: {}", id, err);
                    return false;
                }
            },
        };

        let kind = train.kind;
        let cars = train.car_composition;
        let departure = self.scheduled(train, section.departure_time.as_deref(), now);
        let stationary = section.is_stationary();
        let direction = if kind == TrainKind::Shuttle {
            Direction::Ascending
        } else {
            train.direction
        };

        self.active.insert(id.clone(), ActiveTrain::new(section, direction, cars));
        self.set_phase(id, TrainPhase::Standing);
        ctx.emit(TrainEvent::Started {
            train: id.clone(),
            cars,
        });
        tracing::debug!("Train {} started", id);

        match kind {
            TrainKind::Timetabled => match departure {
                Some(departure) if now >= departure => self.run(id, (now - departure) as f64, ctx),
                _ => self.stand(id, false, ctx),
            },
            TrainKind::AdHoc if stationary => self.stand(id, false, ctx),
            TrainKind::AdHoc | TrainKind::Shuttle => self.run(id, 0.0, ctx),
        }
        true
    }

    /// Start running the current section, `elapsed` ms into its profile.
    fn run(&mut self, id: &TrainId, elapsed: f64, ctx: &mut TrainContext<'_>) {
        let now = ctx.now;
        let profile = {
            let (Some(train), Some(active)) = (self.trains.get(id), self.active.get(id)) else {
                return;
            };
            let Some(distance) = self
                .railways
                .get(&train.railway)
                .and_then(|railway| active.section_distance(railway))
            else {
                tracing::warn!("Train {}: section {:?} is off its railway", id, active.section);
                self.stop_train(id, StopReason::Fault, ctx);
                return;
            };

            if train.kind == TrainKind::Shuttle {
                MotionProfile::free_running(distance, self.settings.shuttle_limits)
            } else {
                let target = self
                    .scheduled(train, active.section.arrival_time.as_deref(), now)
                    .map(|arrival| (arrival - now) as f64 + elapsed)
                    .filter(|duration| *duration > 0.0);
                match target {
                    Some(target) => MotionProfile::scheduled(
                        distance,
                        self.settings.limits,
                        target,
                        self.settings.precision_slack,
                        self.settings.schedule_tolerance,
                    ),
                    None => MotionProfile::free_running(distance, self.settings.limits),
                }
            }
        };

        if let Some(active) = self.active.get_mut(id) {
            active.phase = TrainPhase::Running;
            active.profile = Some(profile);
            active.final_stop = false;
        }
        self.set_phase(id, TrainPhase::Running);

        let mut spec = TaskSpec::timer(profile.duration());
        if elapsed > 0.0 {
            spec = spec.with_start_offset(elapsed);
        }
        ctx.start_task(id.clone(), spec);
        self.emit_status(id, ctx);
    }

    /// Dwell at the current stop. Ad hoc trains re-read their live position
    /// first and may start running straight away.
    fn stand(&mut self, id: &TrainId, final_stop: bool, ctx: &mut TrainContext<'_>) {
        let now = ctx.now;
        let (Some(train), Some(railway), Some(active)) = (
            self.trains.get(id),
            self.trains.get(id).and_then(|t| self.railways.get(&t.railway)),
            self.active.get(id),
        ) else {
            return;
        };

        let mut final_stop = final_stop;
        let mut next_section = None;
        if train.kind == TrainKind::AdHoc {
            let final_leg = !self.reported.contains(id);
            match resolve_ad_hoc(train, railway, Some(active.section.to_index()), final_leg) {
                Some(section) => {
                    final_stop = false;
                    next_section = Some(section);
                }
                None => final_stop = true,
            }
        }

        let duration = match train.kind {
            TrainKind::Timetabled => {
                let departure = self.scheduled(train, active.section.departure_time.as_deref(), now);
                (departure.unwrap_or(now) - now).max(self.settings.min_standing_duration) as f64
            }
            TrainKind::AdHoc if final_stop => self.settings.min_standing_duration as f64,
            TrainKind::AdHoc => self.settings.ad_hoc_standing_duration as f64,
            TrainKind::Shuttle => self.settings.shuttle_dwell,
        };

        if let Some(active) = self.active.get_mut(id) {
            if let Some(section) = next_section {
                let moving = !section.is_stationary();
                active.section = section;
                if moving {
                    self.run(id, 0.0, ctx);
                    return;
                }
            }
            active.phase = TrainPhase::Standing;
            active.profile = None;
            active.final_stop = final_stop;
        }
        self.set_phase(id, TrainPhase::Standing);

        ctx.start_task(id.clone(), TaskSpec::timer(duration));
        self.emit_pose(id, if final_stop { 1.0 } else { 0.0 }, true, ctx);
        self.emit_status(id, ctx);
    }

    /// Transition after the train's task completed.
    pub fn advance(&mut self, id: &TrainId, ctx: &mut TrainContext<'_>) {
        let Some(active) = self.active.get(id) else {
            return;
        };
        let (phase, final_stop) = (active.phase, active.final_stop);
        let Some(kind) = self.trains.get(id).map(|t| t.kind) else {
            tracing::warn!(
                "{}",
                TransitError::ReconciliationConflict(format!(
                    "active train {id} is missing from the registry"
                ))
            );
            self.stop_train(id, StopReason::Fault, ctx);
            return;
        };

        match (phase, kind) {
            (TrainPhase::Standing, _) if final_stop => self.stop_train(id, StopReason::Terminated, ctx),
            (TrainPhase::Standing, TrainKind::AdHoc) => self.stand(id, false, ctx),
            (TrainPhase::Standing, _) => self.run(id, 0.0, ctx),
            (TrainPhase::Running, TrainKind::Timetabled) => self.next_section(id, ctx),
            (TrainPhase::Running, TrainKind::AdHoc) => self.stand(id, false, ctx),
            (TrainPhase::Running, TrainKind::Shuttle) => self.next_shuttle_section(id, ctx),
            _ => {}
        }
    }

    fn next_section(&mut self, id: &TrainId, ctx: &mut TrainContext<'_>) {
        let now = ctx.now;
        let (Some(train), Some(active)) = (self.trains.get(id), self.active.get(id)) else {
            return;
        };
        let Some(railway) = self.railways.get(&train.railway) else {
            return;
        };

        let next_index = active.section.timetable_index.map_or(0, |i| i + 1);
        if next_index >= train.stops.len() {
            self.stop_train(id, StopReason::Terminated, ctx);
            return;
        }

        match resolve_timetabled(train, railway, Some(next_index), &self.clock, now) {
            Some(Resolution::Section(section)) => {
                if let Some(active) = self.active.get_mut(id) {
                    active.section = section;
                }
                self.stand(id, false, ctx);
            }
            Some(Resolution::Terminal {
                timetable_index,
                departure_time,
            }) => {
                let next = train.next.clone().filter(|next| self.trains.contains_key(next));
                if let Some(active) = self.active.get_mut(id) {
                    let section = &mut active.section;
                    section.timetable_index = Some(timetable_index);
                    section.departure_time = departure_time;
                    if let Some(station) = section.arrival_station.clone() {
                        section.departure_station = station;
                    }
                }
                match next {
                    Some(next) => self.hand_off(id, &next, ctx),
                    None => self.stand(id, true, ctx),
                }
            }
            None => self.stop_train(id, StopReason::Terminated, ctx),
        }
    }

    /// Continue as the linked next train; tracking follows the hand-off.
    fn hand_off(&mut self, from: &TrainId, to: &TrainId, ctx: &mut TrainContext<'_>) {
        let continued = self.is_active(to) || self.start(to, Some(0), ctx);
        if continued {
            tracing::debug!("Train {} continues as {}", from, to);
            ctx.emit(TrainEvent::HandedOff {
                from: from.clone(),
                to: to.clone(),
            });
            self.stop_train(from, StopReason::HandedOff, ctx);
        } else {
            self.stop_train(from, StopReason::Terminated, ctx);
        }
    }

    fn next_shuttle_section(&mut self, id: &TrainId, ctx: &mut TrainContext<'_>) {
        let Some(active) = self.active.get(id) else {
            return;
        };
        let Some(railway) = self.trains.get(id).and_then(|t| self.railways.get(&t.railway)) else {
            return;
        };

        let index = active.section.to_index();
        let mut direction = active.direction;
        if index == 0 || index >= railway.station_count().saturating_sub(1) {
            direction = direction.reversed();
        }
        let length = direction.sign();
        let arrival_station = usize::try_from(index as i64 + length as i64)
            .ok()
            .and_then(|to| railway.stations.get(to).cloned());
        let departure_station = match railway.station(index).cloned() {
            Ok(station) => station,
            Err(err) => {
                tracing::warn!("Train {}: {}", id, err);
                self.stop_train(id, StopReason::Fault, ctx);
                return;
            }
        };
        let section = Section {
            timetable_index: None,
            index,
            length,
            departure_station,
            departure_time: None,
            arrival_station,
            arrival_time: None,
        };

        if let Some(active) = self.active.get_mut(id) {
            active.section = section;
            active.direction = direction;
        }
        if let Some(train) = self.trains.get_mut(id) {
            train.direction = direction;
        }
        self.stand(id, false, ctx);
    }

    /// Remove a train from the active set. Ad hoc trains that will not come
    /// back are dropped from the registry as well.
    pub fn stop_train(&mut self, id: &TrainId, reason: StopReason, ctx: &mut TrainContext<'_>) {
        ctx.stop_task(id);
        let was_active = self.active.remove(id).is_some();

        let drop_record = match self.trains.get_mut(id) {
            Some(train) => {
                train.phase = reason.phase();
                train.kind == TrainKind::AdHoc
                    && !matches!(reason, StopReason::Reconciled | StopReason::Reset)
            }
            None => false,
        };
        if drop_record {
            self.trains.remove(id);
        }

        if was_active {
            tracing::debug!("Train {} stopped: {:?}", id, reason);
            ctx.emit(TrainEvent::Stopped {
                train: id.clone(),
                reason,
            });
        }
    }

    fn set_phase(&mut self, id: &TrainId, phase: TrainPhase) {
        if let Some(train) = self.trains.get_mut(id) {
            train.phase = phase;
        }
    }

    fn emit_pose(&self, id: &TrainId, progress: f64, standing: bool, ctx: &mut TrainContext<'_>) {
        let (Some(train), Some(active)) = (self.trains.get(id), self.active.get(id)) else {
            return;
        };
        let Some(railway) = self.railways.get(&train.railway) else {
            return;
        };
        let Some(distance) = active.lead_distance(railway, progress) else {
            return;
        };

        match sample(&railway.path, distance, active.cars as usize, railway.car_spacing) {
            Ok(mut cars) => {
                if active.direction == Direction::Descending {
                    for car in &mut cars {
                        car.bearing = reverse_bearing(car.bearing);
                        car.pitch = -car.pitch;
                    }
                }
                ctx.emit(TrainEvent::Pose {
                    train: id.clone(),
                    cars,
                    standing,
                });
            }
            Err(err) => tracing::warn!("Train {}: skipping pose: {}", id, err),
        }
    }

    fn emit_status(&self, id: &TrainId, ctx: &mut TrainContext<'_>) {
        let (Some(train), Some(active)) = (self.trains.get(id), self.active.get(id)) else {
            return;
        };
        let stations = self.railways.get(&train.railway).map_or(0, Railway::station_count);
        ctx.emit(TrainEvent::Status(TrainStatus {
            train: id.clone(),
            railway: train.railway.clone(),
            train_type: train.train_type.clone(),
            number: train.number.clone(),
            direction: active.direction,
            segment: active.section.segment_index(stations),
            departure_station: active.section.departure_station.clone(),
            arrival_station: active.section.arrival_station.clone(),
            destination: train.destination.clone(),
            delay: train.delay,
            standing: active.phase == TrainPhase::Standing,
        }));
    }
}

fn reverse_bearing(bearing: f64) -> f64 {
    let reversed = bearing + 180.0;
    if reversed > 180.0 {
        reversed - 360.0
    } else {
        reversed
    }
}

impl SimSystem for TrainSystem {
    type Key = TrainId;
    type Event = TrainEvent;

    fn name(&self) -> &str {
        "trains"
    }

    fn refresh(&mut self, ctx: &mut TrainContext<'_>) {
        let now = ctx.now;
        let ids: Vec<TrainId> = self.trains.keys().cloned().collect();
        for id in ids {
            // Re-checked per train: starting one may block its linked trains
            let ready = self.trains.get(&id).is_some_and(|t| self.can_activate(t, now));
            if ready {
                self.start(&id, None, ctx);
            }
        }
    }

    fn on_frame(&mut self, key: &TrainId, elapsed: f64, _duration: f64, ctx: &mut TrainContext<'_>) {
        let Some(active) = self.active.get(key) else {
            return;
        };
        if active.phase != TrainPhase::Running {
            return;
        }
        let Some(profile) = active.profile else {
            return;
        };
        self.emit_pose(key, profile.progress(elapsed), false, ctx);
    }

    fn on_complete(&mut self, key: &TrainId, ctx: &mut TrainContext<'_>) {
        self.advance(key, ctx);
    }

    fn stop_all(&mut self, ctx: &mut TrainContext<'_>) {
        let ids: Vec<TrainId> = self.active.keys().cloned().collect();
        for id in ids {
            self.stop_train(&id, StopReason::Reset, ctx);
        }
    }

    fn active_count(&self) -> usize {
        self.active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::LivePatch;
    use crate::testing::{jst, line};
    use crate::timetable::StopTime;
    use transit_core::StationId;
    use transit_core::time::{DAY, MINUTE, SECOND};
    use transit_runtime::{EventBus, FrameScheduler, TaskOwners};

    struct Harness {
        system: TrainSystem,
        sched: FrameScheduler,
        owners: TaskOwners<TrainId>,
        bus: EventBus<TrainEvent>,
    }

    impl Harness {
        fn new() -> Self {
            let limits = MotionLimits::from_kmh(80.0, 3.0).unwrap();
            let settings = TrainSettings {
                standing_duration: MINUTE,
                min_standing_duration: 30 * SECOND,
                ad_hoc_standing_duration: 15 * SECOND,
                precision_slack: 25_000.0,
                schedule_tolerance: 60_000.0,
                limits,
                shuttle_limits: limits.scaled(12.0).unwrap(),
                shuttle_dwell: 1000.0,
                ad_hoc_retention: DAY,
            };
            let clock = ServiceClock {
                precision_slack_ms: 0,
                ..ServiceClock::default()
            };
            Self {
                system: TrainSystem::new(settings, clock, vec![line()]),
                sched: FrameScheduler::new(),
                owners: TaskOwners::new(),
                bus: EventBus::new(),
            }
        }

        fn refresh(&mut self, now: Timestamp) {
            let mut ctx = SystemContext::new(now, &mut self.sched, &mut self.owners, &mut self.bus);
            self.system.refresh(&mut ctx);
        }

        fn reconcile(&mut self, now: Timestamp, reports: &[LiveTrain], notices: &[(RailwayId, RailwayNotice)]) {
            let mut ctx = SystemContext::new(now, &mut self.sched, &mut self.owners, &mut self.bus);
            self.system.reconcile(reports, notices, &mut ctx);
        }

        fn stop_all(&mut self, now: Timestamp) {
            let mut ctx = SystemContext::new(now, &mut self.sched, &mut self.owners, &mut self.bus);
            self.system.stop_all(&mut ctx);
        }

        fn tick(&mut self, now: Timestamp) {
            for event in self.sched.tick(now) {
                let mut ctx = SystemContext::new(now, &mut self.sched, &mut self.owners, &mut self.bus);
                ctx.dispatch(&mut self.system, event);
            }
        }

        /// Pin the pending task at `now`, then run it to completion.
        fn step(&mut self, now: Timestamp) -> Timestamp {
            self.tick(now);
            let later = now + 10 * MINUTE;
            self.tick(later);
            later
        }

        fn events(&mut self) -> Vec<TrainEvent> {
            self.bus.drain()
        }
    }

    fn entry(id: &str, direction: &str, stops: Vec<StopTime>, previous: &[&str], next: &[&str]) -> TimetableEntry {
        TimetableEntry {
            id: id.into(),
            railway: "Line".into(),
            direction: direction.into(),
            train_type: Some("Local".into()),
            number: None,
            stops,
            previous: previous.iter().map(|s| TrainId::from(*s)).collect(),
            next: next.iter().map(|s| TrainId::from(*s)).collect(),
            origin: None,
            destination: None,
        }
    }

    fn short_run() -> TimetableEntry {
        entry(
            "Line.101",
            "East",
            vec![
                StopTime::new("X", None, Some("10:00")),
                StopTime::new("Y", Some("10:04"), None),
            ],
            &[],
            &[],
        )
    }

    fn stopped(events: &[TrainEvent], reason: StopReason) -> Vec<TrainId> {
        events
            .iter()
            .filter_map(|e| match e {
                TrainEvent::Stopped { train, reason: r } if *r == reason => Some(train.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn train_before_departure_stands() {
        let mut h = Harness::new();
        let now = jst(9, 59) + 30 * SECOND;
        h.system.load_timetable(vec![short_run()], now);
        h.refresh(now);

        let id = TrainId::from("Line.101");
        assert_eq!(h.system.phase(&id), TrainPhase::Standing);
        let events = h.events();
        assert!(matches!(events[0], TrainEvent::Started { cars: 2, .. }));
        assert!(events.iter().any(|e| matches!(e, TrainEvent::Pose { standing: true, .. })));

        // Dwell lasts until the 10:00 departure
        h.tick(now);
        h.tick(jst(10, 0));
        assert_eq!(h.system.phase(&id), TrainPhase::Running);
    }

    #[test]
    fn train_joins_mid_section_and_terminates() {
        let mut h = Harness::new();
        let now = jst(10, 2);
        h.system.load_timetable(vec![short_run()], now);
        h.refresh(now);

        let id = TrainId::from("Line.101");
        assert_eq!(h.system.phase(&id), TrainPhase::Running);
        let profile = h.system.active(&id).unwrap().profile.unwrap();
        assert!(profile.duration() > 2.0 * MINUTE as f64);

        // Arrival: final dwell at Y
        let now = h.step(now);
        let active = h.system.active(&id).unwrap();
        assert!(active.final_stop);
        assert_eq!(active.section.timetable_index, Some(1));
        assert_eq!(h.system.phase(&id), TrainPhase::Standing);

        h.step(now);
        assert_eq!(stopped(&h.events(), StopReason::Terminated), vec![id.clone()]);
        assert_eq!(h.system.phase(&id), TrainPhase::Terminated);
        assert_eq!(h.system.active_count(), 0);

        h.refresh(jst(10, 3));
        assert!(!h.system.is_active(&id));
    }

    #[test]
    fn intermediate_stop_stands_before_next_section() {
        let mut h = Harness::new();
        let now = jst(10, 1);
        let stops = vec![
            StopTime::new("X", None, Some("10:00")),
            StopTime::new("Y", Some("10:04"), Some("10:20")),
            StopTime::new("Z", Some("10:24"), None),
        ];
        h.system.load_timetable(vec![entry("Line.103", "East", stops, &[], &[])], now);
        h.refresh(now);

        let id = TrainId::from("Line.103");
        h.tick(now);
        h.tick(jst(10, 10));
        let active = h.system.active(&id).unwrap();
        assert_eq!(active.phase, TrainPhase::Standing);
        assert!(!active.final_stop);
        assert_eq!(active.section.departure_station, StationId::from("Y"));
        assert_eq!(active.section.index, 1);
    }

    #[test]
    fn hand_off_continues_as_next_train() {
        let mut h = Harness::new();
        let now = jst(10, 2);
        let first = entry(
            "Line.101",
            "East",
            vec![
                StopTime::new("X", None, Some("10:00")),
                StopTime::new("Y", Some("10:04"), None),
            ],
            &[],
            &["Line.102"],
        );
        let second = entry(
            "Line.102",
            "East",
            vec![
                StopTime::new("Y", None, Some("10:30")),
                StopTime::new("Z", Some("10:34"), None),
            ],
            &["Line.101"],
            &[],
        );
        h.system.load_timetable(vec![first, second], now);
        h.refresh(now);

        let (a, b) = (TrainId::from("Line.101"), TrainId::from("Line.102"));
        assert!(h.system.is_active(&a));
        assert!(!h.system.is_active(&b));
        h.events();

        h.step(now);
        let events = h.events();
        assert!(events.contains(&TrainEvent::HandedOff {
            from: a.clone(),
            to: b.clone()
        }));
        assert_eq!(stopped(&events, StopReason::HandedOff), vec![a.clone()]);
        assert_eq!(h.system.phase(&a), TrainPhase::NextLeg);
        assert_eq!(h.system.phase(&b), TrainPhase::Standing);

        h.refresh(jst(10, 15));
        assert!(!h.system.is_active(&a));
    }

    #[test]
    fn live_delay_restarts_active_train() {
        let mut h = Harness::new();
        let now = jst(10, 2);
        h.system.load_timetable(vec![short_run()], now);
        h.refresh(now);
        h.events();

        let id = TrainId::from("Line.101");
        let report = LiveTrain {
            id: id.clone(),
            railway: "Line".into(),
            direction: "East".into(),
            number: None,
            from_station: None,
            to_station: None,
            patch: LivePatch {
                delay: Some(MINUTE),
                ..LivePatch::default()
            },
        };
        h.reconcile(now, &[report.clone()], &[]);
        assert_eq!(stopped(&h.events(), StopReason::Reconciled), vec![id.clone()]);
        assert_eq!(h.system.train(&id).unwrap().delay, MINUTE);

        h.refresh(now);
        assert!(h.system.is_active(&id));

        // Unchanged report keeps the train running
        h.events();
        h.reconcile(now, &[report], &[]);
        assert!(stopped(&h.events(), StopReason::Reconciled).is_empty());
        assert!(h.system.is_active(&id));
    }

    #[test]
    fn notice_suspends_unreported_trains() {
        let mut h = Harness::new();
        let now = jst(10, 2);
        h.system.load_timetable(vec![short_run()], now);
        h.refresh(now);

        let id = TrainId::from("Line.101");
        let notice = vec![(RailwayId::from("Line"), RailwayNotice::Suspended)];
        h.reconcile(now, &[], &notice);
        assert_eq!(stopped(&h.events(), StopReason::Suspended), vec![id.clone()]);
        h.refresh(now);
        assert!(!h.system.is_active(&id));

        let report = LiveTrain {
            id: id.clone(),
            railway: "Line".into(),
            direction: "East".into(),
            number: None,
            from_station: None,
            to_station: None,
            patch: LivePatch::default(),
        };
        h.reconcile(now, &[report], &notice);
        h.refresh(now);
        assert!(h.system.is_active(&id));
    }

    #[test]
    fn ad_hoc_train_follows_live_position_then_expires() {
        let mut h = Harness::new();
        let now = jst(10, 0);
        let report = LiveTrain {
            id: "Line.999".into(),
            railway: "Line".into(),
            direction: "East".into(),
            number: Some("999".into()),
            from_station: Some("X".into()),
            to_station: Some("Y".into()),
            patch: LivePatch {
                destination: Some("Z".into()),
                ..LivePatch::default()
            },
        };
        h.reconcile(now, &[report], &[]);

        let id = TrainId::from("Line.999.Today");
        let train = h.system.train(&id).unwrap();
        assert_eq!(train.kind, TrainKind::AdHoc);
        assert_eq!(train.car_composition, 2);

        h.refresh(now);
        let active = h.system.active(&id).unwrap();
        assert_eq!(active.phase, TrainPhase::Running);
        assert_eq!((active.section.index, active.section.length), (0, 1));

        // Reached the reported station: waits for fresh data
        h.step(now);
        let active = h.system.active(&id).unwrap();
        assert_eq!(active.phase, TrainPhase::Standing);
        assert!(active.section.is_stationary());
        assert!(!active.final_stop);

        h.reconcile(now + DAY, &[], &[]);
        assert_eq!(stopped(&h.events(), StopReason::Expired), vec![id.clone()]);
        assert!(h.system.train(&id).is_none());
    }

    #[test]
    fn unknown_station_never_starts() {
        let mut h = Harness::new();
        let now = jst(10, 2);
        let stops = vec![
            StopTime::new("X", None, Some("10:00")),
            StopTime::new("Q", Some("10:04"), None),
        ];
        h.system.load_timetable(vec![entry("Line.105", "East", stops, &[], &[])], now);
        h.refresh(now);
        assert_eq!(h.system.active_count(), 0);
        assert!(h.events().is_empty());
    }

    #[test]
    fn descending_pose_faces_backwards() {
        let mut h = Harness::new();
        let now = jst(10, 2);
        let stops = vec![
            StopTime::new("Z", None, Some("10:00")),
            StopTime::new("Y", Some("10:04"), None),
        ];
        h.system.load_timetable(vec![entry("Line.202", "West", stops, &[], &[])], now);
        h.refresh(now);

        let id = TrainId::from("Line.202");
        let active = h.system.active(&id).unwrap();
        assert_eq!((active.section.index, active.section.length), (2, -1));

        h.events();
        h.tick(now);
        let poses: Vec<Vec<_>> = h
            .events()
            .into_iter()
            .filter_map(|e| match e {
                TrainEvent::Pose { cars, .. } => Some(cars),
                _ => None,
            })
            .collect();
        assert_eq!(poses.len(), 1);
        assert_eq!(poses[0].len(), 2);
        for car in &poses[0] {
            assert!((car.bearing + 90.0).abs() < 1.0, "bearing {}", car.bearing);
        }
    }

    #[test]
    fn shuttle_reverses_at_line_end() {
        let mut h = Harness::new();
        let now = jst(10, 0);
        assert_eq!(h.system.spawn_shuttles(), 1);
        h.refresh(now);

        let id = TrainId::from("Line.Shuttle");
        assert_eq!(h.system.phase(&id), TrainPhase::Running);

        let now = h.step(now);
        assert_eq!(h.system.active(&id).unwrap().section.index, 1);
        let now = h.step(now);
        assert_eq!(h.system.phase(&id), TrainPhase::Running);
        h.step(now);

        let active = h.system.active(&id).unwrap();
        assert_eq!(active.direction, Direction::Descending);
        assert_eq!((active.section.index, active.section.length), (2, -1));
        assert_eq!(active.section.arrival_station, Some(StationId::from("Y")));
    }

    #[test]
    fn stop_all_resets_for_restart() {
        let mut h = Harness::new();
        let now = jst(10, 0);
        h.system.spawn_shuttles();
        h.refresh(now);
        h.events();

        h.stop_all(now);
        assert_eq!(h.system.active_count(), 0);
        assert_eq!(stopped(&h.events(), StopReason::Reset).len(), 1);
        assert!(h.sched.is_empty());

        h.refresh(now);
        assert_eq!(h.system.active_count(), 1);
    }

    #[test]
    fn next_day_reload_restarts_finished_train() {
        let mut h = Harness::new();
        let id = TrainId::from("Line.101");
        let now = jst(10, 2);
        h.system.load_timetable(vec![short_run()], now);
        h.refresh(now);
        let now = h.step(now);
        h.step(now);
        assert_eq!(h.system.phase(&id), TrainPhase::Terminated);
        h.system.trains.get_mut(&id).unwrap().delay = MINUTE;
        h.events();

        h.system.load_timetable(vec![short_run()], jst(4, 0) + DAY);
        let train = h.system.train(&id).unwrap();
        assert_eq!(train.phase, TrainPhase::Inactive);
        assert_eq!(train.delay, 0);
        assert_eq!(train.start, jst(9, 59) + DAY);

        // Joins two minutes into the first section
        let now = jst(10, 2) + DAY;
        h.refresh(now);
        assert!(h.system.is_active(&id));
        assert_eq!(h.system.phase(&id), TrainPhase::Running);

        h.events();
        h.tick(now);
        let lead: Vec<f64> = h
            .events()
            .into_iter()
            .filter_map(|e| match e {
                TrainEvent::Pose { cars, standing: false, .. } => Some(cars[0].coord.lng),
                _ => None,
            })
            .collect();
        assert_eq!(lead.len(), 1);
        assert!(lead[0] > 139.705, "lead car at {}", lead[0]);
    }

    #[test]
    fn reload_keeps_running_train() {
        let mut h = Harness::new();
        let id = TrainId::from("Line.101");
        let now = jst(10, 2);
        h.system.load_timetable(vec![short_run()], now);
        h.refresh(now);
        h.system.trains.get_mut(&id).unwrap().delay = SECOND;

        h.system.load_timetable(vec![short_run()], now);
        assert_eq!(h.system.phase(&id), TrainPhase::Running);
        assert_eq!(h.system.train(&id).unwrap().delay, SECOND);
        assert!(h.system.is_active(&id));
    }

    #[test]
    fn section_index_stays_on_the_line() {
        let mut h = Harness::new();
        let id = TrainId::from("Line.103");
        let stops = vec![
            StopTime::new("X", None, Some("10:00")),
            StopTime::new("Y", Some("10:04"), Some("10:05")),
            StopTime::new("Z", Some("10:09"), None),
        ];
        let start = jst(9, 59);
        h.system.load_timetable(vec![entry("Line.103", "East", stops, &[], &[])], start);
        h.refresh(start);

        let stations = h.system.railway(&RailwayId::from("Line")).unwrap().station_count();
        let mut segments = HashSet::new();
        let mut now = start;
        while now <= jst(10, 20) {
            h.tick(now);
            if let Some(active) = h.system.active(&id) {
                let section = &active.section;
                assert!(section.from_index() < stations && section.to_index() < stations);
                assert!(section.segment_index(stations) <= stations - 2);
            }
            for event in h.events() {
                if let TrainEvent::Status(status) = event {
                    assert!(status.segment <= stations - 2);
                    segments.insert(status.segment);
                }
            }
            now += 10 * SECOND;
        }

        assert_eq!(segments, HashSet::from([0, 1]));
        assert_eq!(h.system.phase(&id), TrainPhase::Terminated);
    }

    #[test]
    fn shuttle_without_stations_faults() {
        let mut h = Harness::new();
        let now = jst(10, 0);
        h.system.spawn_shuttles();
        h.refresh(now);
        let id = TrainId::from("Line.Shuttle");
        assert!(h.system.is_active(&id));
        h.events();

        h.system.railways.get_mut(&RailwayId::from("Line")).unwrap().stations.clear();
        h.step(now);
        assert_eq!(stopped(&h.events(), StopReason::Fault), vec![id.clone()]);
        assert_eq!(h.system.phase(&id), TrainPhase::Terminated);

        let mut fresh = Harness::new();
        fresh.system.railways.get_mut(&RailwayId::from("Line")).unwrap().stations.clear();
        fresh.system.spawn_shuttles();
        fresh.refresh(now);
        assert_eq!(fresh.system.active_count(), 0);
    }

    #[test]
    fn reversed_bearing_wraps() {
        assert_eq!(reverse_bearing(90.0), -90.0);
        assert_eq!(reverse_bearing(-90.0), 90.0);
        assert_eq!(reverse_bearing(0.0), 180.0);
    }
}
