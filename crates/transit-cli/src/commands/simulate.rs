//! Scenario replay command

use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::io::Write;
use std::path::Path;
use transit_core::Timestamp;
use transit_motion::PathSample;
use transit_sim::{EntityId, ReplayFeed, Scenario, SimEvent, Simulation};

pub struct SimulateArgs {
    pub scenario: String,
    pub config: Option<String>,
    pub poses: bool,
}

pub fn run(args: SimulateArgs) -> Result<()> {
    let scenario = Scenario::load(Path::new(&args.scenario))
        .with_context(|| format!("Failed to load scenario {}", args.scenario))?;
    let config = super::load_config(args.config.as_deref())?;

    let mut sim = Simulation::new(config, &scenario.network)?;
    if scenario.shuttle {
        let spawned = sim.spawn_shuttles();
        tracing::info!("Spawned {} shuttle trains", spawned);
    }
    let mut feed = ReplayFeed::new(&scenario);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut printed = 0usize;
    let mut peak = 0usize;

    for now in scenario.ticks() {
        sim.poll(&mut feed, now);
        for event in sim.tick(now) {
            if !args.poses && matches!(event, SimEvent::Pose { .. }) {
                continue;
            }
            writeln!(out, "{}", event_json(now, &event))?;
            printed += 1;
        }
        peak = peak.max(sim.active_count());
    }

    tracing::info!(
        "Scenario {}: {} events, at most {} active entities",
        scenario.name,
        printed,
        peak
    );
    Ok(())
}

fn entity_json(entity: &EntityId) -> Value {
    match entity {
        EntityId::Train(id) => json!({ "kind": "train", "id": id }),
        EntityId::Flight(id) => json!({ "kind": "flight", "id": id }),
    }
}

fn pose_json(pose: &PathSample) -> Value {
    json!({
        "lng": pose.coord.lng,
        "lat": pose.coord.lat,
        "altitude": pose.altitude,
        "bearing": pose.bearing,
        "pitch": pose.pitch,
    })
}

fn event_json(now: Timestamp, event: &SimEvent) -> Value {
    match event {
        SimEvent::Started { entity, cars } => json!({
            "t": now,
            "event": "started",
            "entity": entity_json(entity),
            "cars": cars,
        }),
        SimEvent::Pose {
            entity,
            cars,
            standing,
        } => json!({
            "t": now,
            "event": "pose",
            "entity": entity_json(entity),
            "standing": standing,
            "cars": cars.iter().map(pose_json).collect::<Vec<_>>(),
        }),
        SimEvent::Train(status) => json!({
            "t": now,
            "event": "train",
            "id": status.train,
            "railway": status.railway,
            "type": status.train_type,
            "number": status.number,
            "direction": status.direction,
            "segment": status.segment,
            "from": status.departure_station,
            "to": status.arrival_station,
            "destination": status.destination,
            "delay_s": status.delay / 1000,
            "standing": status.standing,
        }),
        SimEvent::Flight(info) => json!({
            "t": now,
            "event": "flight",
            "id": info.flight,
            "airline": info.airline,
            "number": info.number,
            "origin": info.origin,
            "destination": info.destination,
            "status": info.status,
            "route": info.route,
            "scheduled": info.scheduled,
            "estimated": info.estimated,
            "actual": info.actual,
            "standing": info.standing,
        }),
        SimEvent::HandedOff { from, to } => json!({
            "t": now,
            "event": "handed_off",
            "from": from,
            "to": to,
        }),
        SimEvent::Stopped { entity, terminated } => json!({
            "t": now,
            "event": "stopped",
            "entity": entity_json(entity),
            "terminated": terminated,
        }),
    }
}
