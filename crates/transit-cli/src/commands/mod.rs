//! CLI command implementations

pub mod profile;
pub mod simulate;
pub mod validate;

use anyhow::{Context, Result};
use std::path::Path;
use transit_sim::SimConfig;

/// The given config file, or the layered config when none is given
pub fn load_config(path: Option<&str>) -> Result<SimConfig> {
    match path {
        Some(path) => SimConfig::load_from_file(Path::new(path))
            .with_context(|| format!("Failed to load config {}", path)),
        None => SimConfig::load().context("Failed to load layered config"),
    }
}
