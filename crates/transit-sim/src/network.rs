//! Static network records: path geometry, railways and airports
//!
//! Records arrive already parsed; building them into simulation types is
//! where malformed geometry is found. Bad records are skipped with a
//! warning. Only a network with no usable path at all is an error.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use transit_air::Side;
use transit_core::{LngLat, RailwayId, Result, RouteId, StationId, TransitError};
use transit_motion::Path;
use transit_rail::Railway;

/// A route's vertex list, each vertex `[lng, lat]` or `[lng, lat, elevation]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathRecord {
    pub id: RouteId,
    pub coords: Vec<Vec<f64>>,
}

impl PathRecord {
    pub fn build(&self) -> Result<Path> {
        let coords = self
            .coords
            .iter()
            .enumerate()
            .map(|(i, c)| match c.as_slice() {
                [lng, lat] => Ok(LngLat::new(*lng, *lat)),
                [lng, lat, elevation] => Ok(LngLat::with_elevation(*lng, *lat, *elevation)),
                _ => Err(TransitError::malformed_path(
                    self.id.as_str(),
                    format!("vertex {i} has {} components", c.len()),
                )),
            })
            .collect::<Result<Vec<_>>>()?;
        Path::new(self.id.clone(), coords)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RailwayRecord {
    pub id: RailwayId,
    /// Geometry to run on; the railway id when absent
    #[serde(default)]
    pub path: Option<RouteId>,
    pub stations: Vec<StationId>,
    /// Distance of each station along the path in meters
    pub station_offsets: Vec<f64>,
    /// Feed direction name in which station indices increase
    pub ascending: String,
    #[serde(default = "default_car_composition")]
    pub car_composition: u32,
    #[serde(default)]
    pub car_spacing: Option<f64>,
}

fn default_car_composition() -> u32 {
    1
}

/// Everything static the simulation runs on
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Network {
    #[serde(default)]
    pub paths: Vec<PathRecord>,
    #[serde(default)]
    pub railways: Vec<RailwayRecord>,
    /// Side of the pattern airport each remote airport lies on
    #[serde(default)]
    pub airports: HashMap<String, Side>,
}

/// Network records turned into simulation types
#[derive(Debug)]
pub struct BuiltNetwork {
    pub railways: Vec<Railway>,
    /// Every valid path, keyed by route id by the flight system
    pub paths: Vec<Path>,
    pub airports: HashMap<String, Side>,
    /// Ids of records that were dropped
    pub skipped: Vec<String>,
}

impl Network {
    pub fn build(&self) -> Result<BuiltNetwork> {
        let mut skipped = Vec::new();
        let mut seen = HashSet::new();
        let mut paths: Vec<Path> = Vec::new();

        for record in &self.paths {
            if !seen.insert(record.id.clone()) {
                tracing::warn!(
                    "{}",
                    TransitError::ReconciliationConflict(format!(
                        "duplicate path {}, keeping the later record",
                        record.id
                    ))
                );
                paths.retain(|p| p.id() != &record.id);
            }
            match record.build() {
                Ok(path) => paths.push(path),
                Err(err) => {
                    tracing::warn!("Skipping path: {}", err);
                    skipped.push(record.id.to_string());
                }
            }
        }

        if paths.is_empty() {
            return Err(TransitError::Initialization(format!(
                "no valid path among {} records",
                self.paths.len()
            )));
        }

        let by_id: HashMap<&RouteId, &Path> = paths.iter().map(|p| (p.id(), p)).collect();
        let mut railways = Vec::new();
        for record in &self.railways {
            let route = record
                .path
                .clone()
                .unwrap_or_else(|| RouteId::new(record.id.as_str()));
            let Some(path) = by_id.get(&route) else {
                tracing::warn!(
                    "Skipping railway {}: {}",
                    record.id,
                    TransitError::UnknownRoute(route.to_string())
                );
                skipped.push(record.id.to_string());
                continue;
            };

            let railway = Railway::new(
                record.id.clone(),
                (*path).clone(),
                record.stations.clone(),
                record.station_offsets.clone(),
                record.ascending.clone(),
                record.car_composition,
            );
            match railway {
                Ok(railway) => railways.push(match record.car_spacing {
                    Some(spacing) => railway.with_car_spacing(spacing),
                    None => railway,
                }),
                Err(err) => {
                    tracing::warn!("Skipping railway {}: {}", record.id, err);
                    skipped.push(record.id.to_string());
                }
            }
        }

        tracing::info!(
            "Built network: {} paths, {} railways, {} skipped",
            paths.len(),
            railways.len(),
            skipped.len()
        );
        Ok(BuiltNetwork {
            railways,
            paths,
            airports: self.airports.clone(),
            skipped,
        })
    }
}
