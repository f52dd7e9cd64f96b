//! Path geometry with a precomputed cumulative-distance table

use transit_core::geo::{self, LngLat};
use transit_core::{Result, RouteId, TransitError};

/// Table entry for the segment starting at one vertex
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathNode {
    /// Distance from the start of the path in meters
    pub distance: f64,
    /// Initial bearing of the segment in degrees
    pub bearing: f64,
    /// Grade in per mille (meters of rise per kilometer)
    pub grade: f64,
    /// Pitch in radians, `atan(grade / 1000)`
    pub pitch: f64,
}

/// An ordered vertex list with one table entry per vertex.
///
/// Consecutive duplicate vertices are dropped, so table distances strictly
/// increase. A path that collapses to a single position keeps two identical
/// vertices with zero-length entries and samples to that position.
#[derive(Debug, Clone)]
pub struct Path {
    id: RouteId,
    coords: Vec<LngLat>,
    table: Vec<PathNode>,
}

impl Path {
    pub fn new(id: impl Into<RouteId>, coords: Vec<LngLat>) -> Result<Self> {
        let id = id.into();

        if coords.is_empty() {
            return Err(TransitError::malformed_path(id.as_str(), "no vertices"));
        }
        if let Some(i) = coords.iter().position(|c| !c.is_finite()) {
            return Err(TransitError::malformed_path(
                id.as_str(),
                format!("vertex {i} is not finite"),
            ));
        }

        let before = coords.len();
        let mut coords = coords;
        coords.dedup_by(|b, a| a.same_position(b));
        if coords.len() < before {
            tracing::debug!(
                "Path {}: dropped {} duplicate vertices",
                id,
                before - coords.len()
            );
        }
        if coords.len() == 1 {
            coords.push(coords[0]);
        }

        let table = build_table(&coords);
        Ok(Self { id, coords, table })
    }

    pub fn id(&self) -> &RouteId {
        &self.id
    }

    pub fn coords(&self) -> &[LngLat] {
        &self.coords
    }

    pub fn table(&self) -> &[PathNode] {
        &self.table
    }

    /// Number of vertices (always at least two)
    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    /// Total length in meters
    pub fn total_length(&self) -> f64 {
        self.table.last().map_or(0.0, |node| node.distance)
    }

    pub fn is_degenerate(&self) -> bool {
        self.total_length() <= 0.0
    }

    /// Index of the segment containing `distance`, clamped to `[0, len - 2]`.
    pub fn segment_at(&self, distance: f64) -> usize {
        let upper = self.table.partition_point(|node| node.distance <= distance);
        upper.saturating_sub(1).min(self.table.len() - 2)
    }
}

fn build_table(coords: &[LngLat]) -> Vec<PathNode> {
    let mut table = Vec::with_capacity(coords.len());
    let mut travelled = 0.0;
    let mut last = PathNode {
        distance: 0.0,
        bearing: 0.0,
        grade: 0.0,
        pitch: 0.0,
    };

    for pair in coords.windows(2) {
        let (from, to) = (pair[0], pair[1]);
        let length = geo::distance(from, to);
        let grade = if length > 0.0 {
            (to.elevation - from.elevation) / length * 1000.0
        } else {
            0.0
        };
        last = PathNode {
            distance: travelled,
            bearing: geo::bearing(from, to),
            grade,
            pitch: (grade / 1000.0).atan(),
        };
        table.push(last);
        travelled += length;
    }

    // The final vertex repeats the last segment's orientation
    table.push(PathNode {
        distance: travelled,
        ..last
    });
    table
}
