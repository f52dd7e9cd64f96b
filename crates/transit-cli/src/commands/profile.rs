//! Motion profile inspection command

use anyhow::Result;
use serde_json::json;
use transit_motion::{MotionLimits, MotionProfile};

/// Slack and tolerance used for `--target`, matching the config defaults
const TARGET_SLACK_MS: f64 = 25_000.0;
const TARGET_TOLERANCE_MS: f64 = 60_000.0;

pub struct ProfileArgs {
    pub distance: f64,
    pub max_speed: f64,
    pub acceleration: f64,
    pub kind: String,
    pub target: Option<f64>,
    pub samples: usize,
    pub format: String,
}

pub fn run(args: ProfileArgs) -> Result<()> {
    let limits = MotionLimits::from_kmh(args.max_speed, args.acceleration)?;
    let profile = match (args.kind.as_str(), args.target) {
        ("free", None) => MotionProfile::free_running(args.distance, limits),
        ("free", Some(target)) => MotionProfile::scheduled(
            args.distance,
            limits,
            target * 1000.0,
            TARGET_SLACK_MS,
            TARGET_TOLERANCE_MS,
        ),
        ("departure", _) => MotionProfile::departure(args.distance, limits),
        ("arrival", _) => MotionProfile::arrival(args.distance, limits.halved()),
        (other, _) => anyhow::bail!(
            "Unknown profile kind '{}'. Use free, departure or arrival.",
            other
        ),
    };

    let steps = args.samples.max(1);
    let samples: Vec<(f64, f64)> = (0..=steps)
        .map(|i| {
            let elapsed = profile.duration() * i as f64 / steps as f64;
            (elapsed, profile.progress(elapsed))
        })
        .collect();

    match args.format.as_str() {
        "json" => {
            let output = json!({
                "kind": args.kind,
                "distance_m": profile.distance(),
                "duration_s": profile.duration() / 1000.0,
                "accel_time_s": profile.accel_time() / 1000.0,
                "cruise_speed_kmh": profile.cruise_speed() * 3_600.0,
                "cruise_distance_m": profile.cruise_distance(),
                "samples": samples
                    .iter()
                    .map(|(elapsed, progress)| json!({ "t_s": elapsed / 1000.0, "progress": progress }))
                    .collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => {
            println!("Profile: {} over {:.0} m", args.kind, profile.distance());
            println!("  Duration:     {:.1} s", profile.duration() / 1000.0);
            println!("  Accel time:   {:.1} s", profile.accel_time() / 1000.0);
            println!("  Cruise speed: {:.1} km/h", profile.cruise_speed() * 3_600.0);
            println!("  Cruising:     {:.0} m", profile.cruise_distance());
            println!();
            for (elapsed, progress) in samples {
                println!("  t={:>8.1}s  progress={:.4}", elapsed / 1000.0, progress);
            }
        }
    }

    Ok(())
}
