//! Spherical-earth geodesy: great-circle distance, initial bearing and
//! forward projection along a bearing.

use serde::{Deserialize, Serialize};

/// Mean earth radius in meters (IUGG)
pub const MEAN_EARTH_RADIUS: f64 = 6_371_008.8;

/// A geographic coordinate in degrees with an optional elevation in meters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
    #[serde(default)]
    pub elevation: f64,
}

impl LngLat {
    pub const fn new(lng: f64, lat: f64) -> Self {
        Self {
            lng,
            lat,
            elevation: 0.0,
        }
    }

    pub const fn with_elevation(lng: f64, lat: f64, elevation: f64) -> Self {
        Self {
            lng,
            lat,
            elevation,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.lng.is_finite() && self.lat.is_finite() && self.elevation.is_finite()
    }

    /// Same horizontal position (elevation ignored)
    pub fn same_position(&self, other: &LngLat) -> bool {
        self.lng == other.lng && self.lat == other.lat
    }
}

impl From<[f64; 2]> for LngLat {
    fn from(arr: [f64; 2]) -> Self {
        Self::new(arr[0], arr[1])
    }
}

impl From<[f64; 3]> for LngLat {
    fn from(arr: [f64; 3]) -> Self {
        Self::with_elevation(arr[0], arr[1], arr[2])
    }
}

/// Great-circle distance in meters (haversine).
pub fn distance(from: LngLat, to: LngLat) -> f64 {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let dlat = lat2 - lat1;
    let dlng = (to.lng - from.lng).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * a.sqrt().atan2((1.0 - a).sqrt()) * MEAN_EARTH_RADIUS
}

/// Initial bearing from `from` to `to` in degrees, in (-180, 180].
pub fn bearing(from: LngLat, to: LngLat) -> f64 {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let dlng = (to.lng - from.lng).to_radians();

    let y = dlng.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlng.cos();
    y.atan2(x).to_degrees()
}

/// Project `distance` meters from `origin` along `bearing` degrees.
///
/// Elevation is carried over unchanged; callers interpolate altitude
/// themselves from the segment grade.
pub fn destination(origin: LngLat, distance: f64, bearing: f64) -> LngLat {
    let lng1 = origin.lng.to_radians();
    let lat1 = origin.lat.to_radians();
    let bearing = bearing.to_radians();
    let radians = distance / MEAN_EARTH_RADIUS;

    let (sin_lat1, cos_lat1) = lat1.sin_cos();
    let (sin_rad, cos_rad) = radians.sin_cos();
    let (sin_bearing, cos_bearing) = bearing.sin_cos();

    let lat2 = (sin_lat1 * cos_rad + cos_lat1 * sin_rad * cos_bearing).asin();
    let lng2 = lng1 + (sin_bearing * sin_rad * cos_lat1).atan2(cos_rad - sin_lat1 * lat2.sin());

    LngLat {
        lng: normalize_longitude(lng2.to_degrees()),
        lat: lat2.to_degrees(),
        elevation: origin.elevation,
    }
}

/// Wrap a longitude into (-180, 180].
pub fn normalize_longitude(lng: f64) -> f64 {
    let wrapped = (lng + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 {
        180.0
    } else {
        wrapped
    }
}
