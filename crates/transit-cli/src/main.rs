//! Transit CLI - Command-line interface for the transit simulation

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{profile, simulate, validate};

#[derive(Parser)]
#[command(name = "transit")]
#[command(about = "Timetable-driven train and flight motion simulation", long_about = None)]
#[command(version)]
struct Cli {
    /// Log filter such as "debug" or "transit_rail=trace" (default: RUST_LOG, then info)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scenario file and print emitted events as JSON lines
    Simulate {
        /// Path to scenario file (JSON)
        scenario: String,

        /// Config file used instead of the layered config
        #[arg(long)]
        config: Option<String>,

        /// Include per-frame pose events
        #[arg(long)]
        poses: bool,
    },

    /// Print the motion profile of one section
    Profile {
        /// Distance in meters
        distance: f64,

        /// Max speed in km/h
        #[arg(long, default_value_t = 80.0)]
        max_speed: f64,

        /// Acceleration in km/h per second
        #[arg(long, default_value_t = 3.0)]
        acceleration: f64,

        /// Profile kind (free, departure, arrival)
        #[arg(long, default_value = "free")]
        kind: String,

        /// Timetabled section time in seconds (free profiles only)
        #[arg(long)]
        target: Option<f64>,

        /// Number of progress samples to print
        #[arg(long, default_value_t = 10)]
        samples: usize,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Check a scenario's network and timetables
    Validate {
        /// Path to scenario file (JSON)
        scenario: String,

        /// Config file used instead of the layered config
        #[arg(long)]
        config: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    transit_sim::init_logging(cli.log_level.as_deref());

    match cli.command {
        Commands::Simulate {
            scenario,
            config,
            poses,
        } => simulate::run(simulate::SimulateArgs {
            scenario,
            config,
            poses,
        }),
        Commands::Profile {
            distance,
            max_speed,
            acceleration,
            kind,
            target,
            samples,
            format,
        } => profile::run(profile::ProfileArgs {
            distance,
            max_speed,
            acceleration,
            kind,
            target,
            samples,
            format,
        }),
        Commands::Validate { scenario, config } => {
            validate::run(validate::ValidateArgs { scenario, config })
        }
    }
}
