//! Logging setup for hosts of the simulation

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global fmt subscriber, writing to stderr.
///
/// An explicit `level` wins, then `RUST_LOG`, then `info`. Subsequent
/// calls are ignored.
pub fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init();

    if result.is_err() {
        tracing::debug!("Logging already initialized");
    }
}
