// Geographic primitives shared across Whisperfield.
//
// Defines `LatLng` (a WGS84 latitude/longitude pair in degrees) and the
// spherical-Earth helpers built on it: haversine great-circle distance,
// forward geodesic projection (`destination_point`), and linear
// interpolation between two coordinates.
//
// This crate is the single source of distance math for the project:
// `whisperfield_drift` uses it for tour planning (`planner.rs`) and camera
// easing (`camera.rs`), and `whisperfield_replay` uses it to scatter demo
// thoughts around an origin.
//
// All functions are pure and deterministic. The Earth is treated as a
// sphere of mean radius 6371 km; the error against the ellipsoid is well
// under 0.5% at the distances a walking tour covers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A position on the globe, in degrees.
///
/// Equality is exact floating-point equality. The planner relies on that to
/// drop candidates sitting precisely on the tour origin.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Great-circle distance to `other` in kilometers.
    pub fn distance_km(self, other: Self) -> f64 {
        haversine_km(self, other)
    }

    /// Point at fraction `t` along the straight lat/lng segment to `other`.
    ///
    /// This is interpolation in coordinate space, not along the great
    /// circle. For viewport panning over a few kilometers the difference is
    /// invisible, and it matches what map libraries do for `setView`.
    pub fn lerp(self, other: Self, t: f64) -> Self {
        Self {
            lat: self.lat + (other.lat - self.lat) * t,
            lng: self.lng + (other.lng - self.lng) * t,
        }
    }
}

impl fmt::Display for LatLng {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lng)
    }
}

/// Haversine great-circle distance between two coordinates, in kilometers.
///
/// Never negative. Identical points return exactly 0.
pub fn haversine_km(a: LatLng, b: LatLng) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    // Rounding can push `h` a hair past 1 for antipodal points.
    let c = 2.0 * h.sqrt().atan2((1.0 - h).max(0.0).sqrt());

    EARTH_RADIUS_KM * c
}

/// The point reached by travelling `distance_km` from `origin` along the
/// initial bearing `bearing_deg` (0 = north, 90 = east).
///
/// Longitude is normalized to [-180, 180).
pub fn destination_point(origin: LatLng, bearing_deg: f64, distance_km: f64) -> LatLng {
    let delta = distance_km / EARTH_RADIUS_KM;
    let theta = bearing_deg.to_radians();
    let phi1 = origin.lat.to_radians();
    let lambda1 = origin.lng.to_radians();

    let phi2 = (phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * theta.cos()).asin();
    let lambda2 = lambda1
        + (theta.sin() * delta.sin() * phi1.cos()).atan2(delta.cos() - phi1.sin() * phi2.sin());

    let lng = (lambda2.to_degrees() + 540.0).rem_euclid(360.0) - 180.0;
    LatLng::new(phi2.to_degrees(), lng)
}
