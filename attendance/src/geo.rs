//! Great-circle distance between device fixes and the institution geofence.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters, matching the backend's own geofence check.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS84 position in degrees. Plain value, no range validation: callers
/// feeding out-of-range degrees get a mathematically defined but physically
/// meaningless distance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// The circular region inside which attendance may be marked.
/// `radius_meters` is always > 0; the config layer enforces that.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeofenceTarget {
    pub center: Coordinate,
    pub radius_meters: f64,
}

impl GeofenceTarget {
    pub const fn new(center: Coordinate, radius_meters: f64) -> Self {
        Self {
            center,
            radius_meters,
        }
    }

    /// Builds the target from the process configuration.
    pub fn from_config() -> Self {
        let cfg = common::config::Config::get();
        Self::new(
            Coordinate::new(cfg.target_latitude, cfg.target_longitude),
            cfg.geofence_radius_meters,
        )
    }

    pub fn contains(&self, distance_meters: f64) -> bool {
        distance_meters <= self.radius_meters
    }
}

/// Haversine distance in meters. Deterministic, symmetric, >= 0, and exactly
/// 0 when both coordinates are bitwise equal.
pub fn distance_meters(a: Coordinate, b: Coordinate) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}
