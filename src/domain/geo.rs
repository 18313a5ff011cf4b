//! Great-circle math on a spherical Earth
//!
//! Inputs are degrees, outputs are meters / degrees.

use crate::domain::types::LatLng;

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6371e3;

/// Haversine distance between two coordinates in meters
///
/// Symmetric, never negative, and zero for coincident points. The haversine
/// term is clamped to [0, 1] so antipodal inputs cannot push `sqrt(1 - a)`
/// below zero through rounding.
pub fn distance_meters(a: LatLng, b: LatLng) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_phi = (b.lat - a.lat).to_radians();
    let d_lambda = (b.lng - a.lng).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Initial bearing from `a` to `b`, normalized to [0, 360)
///
/// Coincident points have no direction; they return 0.
pub fn bearing_degrees(a: LatLng, b: LatLng) -> f64 {
    if a.lat == b.lat && a.lng == b.lng {
        return 0.0;
    }

    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_lambda = (b.lng - a.lng).to_radians();

    let y = d_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * d_lambda.cos();

    normalize_degrees(y.atan2(x).to_degrees())
}

/// Wrap any angle into [0, 360); non-finite angles become 0
pub fn normalize_degrees(deg: f64) -> f64 {
    if !deg.is_finite() {
        return 0.0;
    }
    let wrapped = deg.rem_euclid(360.0);
    // rem_euclid of a tiny negative rounds up to exactly 360.0
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}
