//! Scenario validation command

use anyhow::{Context, Result};
use std::path::Path;
use transit_sim::{Scenario, Simulation};

pub struct ValidateArgs {
    pub scenario: String,
    pub config: Option<String>,
}

pub fn run(args: ValidateArgs) -> Result<()> {
    let scenario = Scenario::load(Path::new(&args.scenario))
        .with_context(|| format!("Failed to load scenario {}", args.scenario))?;
    let config = super::load_config(args.config.as_deref())?;

    println!("Validating scenario '{}'", scenario.name);

    let built = scenario.network.build()?;
    for path in &built.paths {
        if path.is_degenerate() {
            println!("  path {}: single point", path.id());
        } else {
            println!(
                "  path {}: {} vertices, {:.0} m",
                path.id(),
                path.len(),
                path.total_length()
            );
        }
    }
    for railway in &built.railways {
        println!(
            "  railway {}: {} stations, {} cars",
            railway.id,
            railway.station_count(),
            railway.car_composition
        );
    }
    println!("  airports: {}", built.airports.len());

    let mut sim = Simulation::new(config, &scenario.network)?;
    let start = scenario.start_ms();
    let variants = [
        ("weekday", &scenario.timetables.weekday),
        ("holiday", &scenario.timetables.holiday),
    ];
    for (kind, entries) in variants {
        sim.load_timetable(entries.clone(), start);
        let linked = sim.trains().trains().count();
        println!("  {} timetable: {}/{} trains linked", kind, linked, entries.len());
    }

    if built.skipped.is_empty() {
        println!("Scenario is valid.");
    } else {
        println!("{} record(s) skipped:", built.skipped.len());
        for id in &built.skipped {
            println!("  - {}", id);
        }
    }

    Ok(())
}
