//! Layered configuration system
//!
//! Config is loaded with four layers of precedence (highest wins):
//! 1. Environment variables: `TRANSIT_REFRESH_INTERVAL_MS`, `TRANSIT_TIME_FACTOR`
//! 2. Project-local: `.transit/config.toml`
//! 3. Global: `~/.transit/config.toml`
//! 4. Built-in defaults
//!
//! File layers are merged key by key before deserializing, so a project file
//! only lists the keys it changes.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use transit_air::{FlightSettings, RunwayTable};
use transit_core::{Result, ServiceClock, TransitError};
use transit_motion::MotionLimits;
use transit_rail::TrainSettings;

pub const REFRESH_INTERVAL_ENV: &str = "TRANSIT_REFRESH_INTERVAL_MS";
pub const TIME_FACTOR_ENV: &str = "TRANSIT_TIME_FACTOR";

/// Host loop tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Live feed polling interval (ms)
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_ms: i64,
    #[serde(default = "default_frame_rate")]
    pub frame_rate: f64,
    /// Frame rate of entities outside the viewport
    #[serde(default = "default_offscreen_frame_rate")]
    pub offscreen_frame_rate: f64,
    /// Tick gap after which every entity is restarted (ms)
    #[serde(default = "default_stall_threshold")]
    pub stall_threshold_ms: i64,
    /// Degrees around the viewport that still count as visible
    #[serde(default = "default_viewport_margin")]
    pub viewport_margin_deg: f64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: default_refresh_interval(),
            frame_rate: default_frame_rate(),
            offscreen_frame_rate: default_offscreen_frame_rate(),
            stall_threshold_ms: default_stall_threshold(),
            viewport_margin_deg: default_viewport_margin(),
        }
    }
}

fn default_refresh_interval() -> i64 {
    60_000
}
fn default_frame_rate() -> f64 {
    transit_runtime::DEFAULT_FRAME_RATE
}
fn default_offscreen_frame_rate() -> f64 {
    1.0
}
fn default_stall_threshold() -> i64 {
    transit_runtime::DEFAULT_STALL_THRESHOLD
}
fn default_viewport_margin() -> f64 {
    0.005
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    #[serde(default = "default_standing_duration")]
    pub standing_duration_ms: i64,
    #[serde(default = "default_min_standing")]
    pub min_standing_ms: i64,
    #[serde(default = "default_ad_hoc_standing")]
    pub ad_hoc_standing_ms: i64,
    #[serde(default = "default_train_speed")]
    pub max_speed_kmh: f64,
    #[serde(default = "default_train_acceleration")]
    pub acceleration_kmh_per_s: f64,
    /// Lateness a scheduled section may absorb above its timetable time
    #[serde(default = "default_schedule_tolerance")]
    pub schedule_tolerance_ms: i64,
    /// How long an ad hoc train survives without live reports
    #[serde(default = "default_ad_hoc_retention")]
    pub ad_hoc_retention_ms: i64,
    #[serde(default = "default_time_factor")]
    pub shuttle_time_factor: f64,
    #[serde(default = "default_shuttle_dwell")]
    pub shuttle_dwell_ms: i64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            standing_duration_ms: default_standing_duration(),
            min_standing_ms: default_min_standing(),
            ad_hoc_standing_ms: default_ad_hoc_standing(),
            max_speed_kmh: default_train_speed(),
            acceleration_kmh_per_s: default_train_acceleration(),
            schedule_tolerance_ms: default_schedule_tolerance(),
            ad_hoc_retention_ms: default_ad_hoc_retention(),
            shuttle_time_factor: default_time_factor(),
            shuttle_dwell_ms: default_shuttle_dwell(),
        }
    }
}

fn default_standing_duration() -> i64 {
    60_000
}
fn default_min_standing() -> i64 {
    30_000
}
fn default_ad_hoc_standing() -> i64 {
    15_000
}
fn default_train_speed() -> f64 {
    80.0
}
fn default_train_acceleration() -> f64 {
    3.0
}
fn default_schedule_tolerance() -> i64 {
    60_000
}
fn default_ad_hoc_retention() -> i64 {
    transit_core::time::DAY
}
fn default_time_factor() -> f64 {
    12.0
}
fn default_shuttle_dwell() -> i64 {
    1_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightConfig {
    #[serde(default = "default_standing_duration")]
    pub standing_duration_ms: i64,
    #[serde(default = "default_flight_speed")]
    pub max_speed_kmh: f64,
    #[serde(default = "default_flight_acceleration")]
    pub acceleration_kmh_per_s: f64,
    /// Minimum gap between two movements on one runway
    #[serde(default = "default_min_interval")]
    pub min_interval_ms: i64,
}

impl Default for FlightConfig {
    fn default() -> Self {
        Self {
            standing_duration_ms: default_standing_duration(),
            max_speed_kmh: default_flight_speed(),
            acceleration_kmh_per_s: default_flight_acceleration(),
            min_interval_ms: default_min_interval(),
        }
    }
}

fn default_flight_speed() -> f64 {
    500.0
}
fn default_flight_acceleration() -> f64 {
    12.0
}
fn default_min_interval() -> i64 {
    90_000
}

/// Top-level config file structure; every key is optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub trains: TrainConfig,
    #[serde(default)]
    pub flights: FlightConfig,
    #[serde(default)]
    pub clock: ServiceClock,
    #[serde(default)]
    pub runways: RunwayTable,
}

impl SimConfig {
    /// Load config with layered precedence: global < project < env vars
    pub fn load() -> Result<Self> {
        let mut layers = Vec::new();
        if let Some(global_path) = Self::global_config_path() {
            layers.push(global_path);
        }
        layers.push(PathBuf::from(".transit/config.toml"));

        let mut config = Self::from_layers(&layers)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load config from a specific file path only
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let mut config = Self::from_table(Self::load_file(path)?)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Self::from_table(toml::from_str(content)?)
    }

    pub fn train_settings(&self) -> Result<TrainSettings> {
        let trains = &self.trains;
        let limits = MotionLimits::from_kmh(trains.max_speed_kmh, trains.acceleration_kmh_per_s)?;
        Ok(TrainSettings {
            standing_duration: trains.standing_duration_ms,
            min_standing_duration: trains.min_standing_ms,
            ad_hoc_standing_duration: trains.ad_hoc_standing_ms,
            precision_slack: self.clock.precision_slack_ms as f64,
            schedule_tolerance: trains.schedule_tolerance_ms as f64,
            limits,
            shuttle_limits: limits.scaled(trains.shuttle_time_factor)?,
            shuttle_dwell: trains.shuttle_dwell_ms as f64,
            ad_hoc_retention: trains.ad_hoc_retention_ms,
        })
    }

    pub fn flight_settings(&self) -> Result<FlightSettings> {
        let flights = &self.flights;
        Ok(FlightSettings {
            standing_duration: flights.standing_duration_ms,
            limits: MotionLimits::from_kmh(flights.max_speed_kmh, flights.acceleration_kmh_per_s)?,
            min_interval: flights.min_interval_ms,
        })
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".transit").join("config.toml"))
    }

    /// Merge every existing file in order, later files winning
    fn from_layers(paths: &[PathBuf]) -> Result<Self> {
        let mut merged = toml::Table::new();
        for path in paths.iter().filter(|p| p.exists()) {
            tracing::debug!("Loading config layer {}", path.display());
            merge_tables(&mut merged, Self::load_file(path)?);
        }
        Self::from_table(merged)
    }

    fn from_table(table: toml::Table) -> Result<Self> {
        let config: SimConfig = toml::Value::Table(table).try_into()?;
        config.validate()?;
        Ok(config)
    }

    fn load_file(path: &Path) -> Result<toml::Table> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            TransitError::ConfigError(format!("Failed to parse config {}: {}", path.display(), e))
        })
    }

    fn validate(&self) -> Result<()> {
        let runtime = &self.runtime;
        if runtime.refresh_interval_ms <= 0 {
            return Err(TransitError::ConfigError(format!(
                "refresh_interval_ms must be positive, got {}",
                runtime.refresh_interval_ms
            )));
        }
        for (name, hz) in [
            ("frame_rate", runtime.frame_rate),
            ("offscreen_frame_rate", runtime.offscreen_frame_rate),
        ] {
            if !(hz.is_finite() && hz > 0.0) {
                return Err(TransitError::ConfigError(format!("{name} must be positive, got {hz}")));
            }
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup(REFRESH_INTERVAL_ENV) {
            match raw.trim().parse::<i64>() {
                Ok(ms) if ms > 0 => self.runtime.refresh_interval_ms = ms,
                _ => tracing::warn!("Ignoring {}={:?}, expected a positive integer", REFRESH_INTERVAL_ENV, raw),
            }
        }
        if let Some(raw) = lookup(TIME_FACTOR_ENV) {
            match raw.trim().parse::<f64>() {
                Ok(factor) if factor.is_finite() && factor > 0.0 => {
                    self.trains.shuttle_time_factor = factor
                }
                _ => tracing::warn!("Ignoring {}={:?}, expected a positive number", TIME_FACTOR_ENV, raw),
            }
        }
    }
}

/// Recursively overlay `overlay` onto `base`. Tables merge, anything else
/// is replaced.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match value {
            toml::Value::Table(incoming) => match base.get_mut(&key) {
                Some(toml::Value::Table(existing)) => merge_tables(existing, incoming),
                _ => {
                    base.insert(key, toml::Value::Table(incoming));
                }
            },
            other => {
                base.insert(key, other);
            }
        }
    }
}
