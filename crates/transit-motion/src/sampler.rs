//! Distance-to-pose evaluation - binary search + forward projection

use crate::path::Path;
use transit_core::geo::{self, LngLat};
use transit_core::{Result, TransitError};

/// Pose of one car
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathSample {
    pub coord: LngLat,
    /// Altitude in meters
    pub altitude: f64,
    /// Heading in degrees
    pub bearing: f64,
    /// Pitch in radians
    pub pitch: f64,
}

impl PathSample {
    pub fn is_finite(&self) -> bool {
        self.coord.is_finite()
            && self.altitude.is_finite()
            && self.bearing.is_finite()
            && self.pitch.is_finite()
    }
}

/// Sample `car_count` poses spaced `car_spacing` meters apart, centered on
/// `distance`.
///
/// Distances outside the path clamp to the first or last segment and are
/// projected along that segment's bearing.
pub fn sample(
    path: &Path,
    distance: f64,
    car_count: usize,
    car_spacing: f64,
) -> Result<Vec<PathSample>> {
    if !distance.is_finite() || !car_spacing.is_finite() {
        return Err(TransitError::NumericDegeneracy(format!(
            "path {}: cannot sample at distance {distance} with spacing {car_spacing}",
            path.id()
        )));
    }

    let coords = path.coords();
    let table = path.table();
    let last_segment = table.len() - 2;
    let car_count = car_count.max(1);

    let mut distance = distance - car_spacing * (car_count - 1) as f64 / 2.0;
    let mut index = path.segment_at(distance);
    let mut samples = Vec::with_capacity(car_count);

    for _ in 0..car_count {
        while index < last_segment && distance > table[index + 1].distance {
            index += 1;
        }
        let node = table[index];
        let origin = coords[index];
        let overshoot = distance - node.distance;

        let sample = PathSample {
            coord: geo::destination(origin, overshoot, node.bearing),
            altitude: origin.elevation + node.grade / 1000.0 * overshoot,
            bearing: node.bearing,
            pitch: node.pitch,
        };
        if !sample.is_finite() {
            return Err(TransitError::NumericDegeneracy(format!(
                "path {}: non-finite pose at {distance} m",
                path.id()
            )));
        }
        samples.push(sample);
        distance += car_spacing;
    }

    Ok(samples)
}
