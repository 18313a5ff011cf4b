//! Position reconciliation
//!
//! Turns a raw `location-update` payload into one canonical `Position` plus
//! the movement signals the session adopts alongside it. Field fallbacks:
//!
//! - speed: `speedKmh`, else `speed` (m/s) x 3.6, else 0
//! - heading, accuracy: value, else 0
//! - moving: `isMoving`, else `movementStatus == "moving"`, else false
//! - gps quality: value, else "unknown"
//!
//! A coordinate of exactly 0.0 counts as missing, same as an absent field.
//! Producers report "no fix" as zeroed coordinates, so a genuine fix on the
//! equator or prime meridian is rejected too.

use crate::domain::geo::normalize_degrees;
use crate::domain::payload::{decode_object, truthy_number, truthy_str, LocationPayload};
use crate::domain::types::{Destination, Position};
use serde_json::Value;

/// m/s to km/h
const MS_TO_KMH: f64 = 3.6;

/// Why a location payload was rejected
#[derive(Debug, Clone, PartialEq)]
pub enum InvalidPositionData {
    /// Payload is not a JSON object
    NotAnObject,
    /// Latitude absent, null, non-numeric or zero
    MissingLatitude,
    /// Longitude absent, null, non-numeric or zero
    MissingLongitude,
    /// Latitude or longitude is infinite
    NonFiniteCoordinate,
}

impl std::fmt::Display for InvalidPositionData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidPositionData::NotAnObject => write!(f, "payload is not an object"),
            InvalidPositionData::MissingLatitude => write!(f, "latitude missing"),
            InvalidPositionData::MissingLongitude => write!(f, "longitude missing"),
            InvalidPositionData::NonFiniteCoordinate => write!(f, "coordinate is not finite"),
        }
    }
}

impl std::error::Error for InvalidPositionData {}

/// Output of a successful reconciliation
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub position: Position,
    pub is_moving: bool,
    pub gps_quality: String,
    /// Destination embedded in the payload, to be applied before the position
    pub destination: Option<Destination>,
    pub estimated_time_to_destination_secs: Option<f64>,
    pub route_status: Option<String>,
}

impl Reconciled {
    #[inline]
    pub fn speed_kmh(&self) -> f64 {
        self.position.speed_kmh
    }

    #[inline]
    pub fn heading_deg(&self) -> f64 {
        self.position.heading_deg
    }
}

/// Reconcile a raw JSON payload
///
/// `now_ms` stands in for a missing or unparseable source timestamp.
pub fn reconcile(payload: &Value, now_ms: u64) -> Result<Reconciled, InvalidPositionData> {
    let decoded: LocationPayload =
        decode_object(payload).ok_or(InvalidPositionData::NotAnObject)?;
    reconcile_payload(decoded, now_ms)
}

/// Reconcile an already-decoded payload
pub fn reconcile_payload(
    payload: LocationPayload,
    now_ms: u64,
) -> Result<Reconciled, InvalidPositionData> {
    let lat = truthy_number(payload.latitude).ok_or(InvalidPositionData::MissingLatitude)?;
    let lng = truthy_number(payload.longitude).ok_or(InvalidPositionData::MissingLongitude)?;
    if !lat.is_finite() || !lng.is_finite() {
        return Err(InvalidPositionData::NonFiniteCoordinate);
    }

    let speed_kmh = truthy_number(payload.speed_kmh)
        .or_else(|| truthy_number(payload.speed.map(|ms| ms * MS_TO_KMH)))
        .map(non_negative)
        .unwrap_or(0.0);
    let heading_deg = truthy_number(payload.heading).map(normalize_degrees).unwrap_or(0.0);
    let accuracy_m = truthy_number(payload.accuracy).map(non_negative).unwrap_or(0.0);

    let is_moving =
        payload.is_moving || payload.movement_status.as_deref() == Some("moving");
    let gps_quality =
        truthy_str(payload.gps_quality.as_deref()).unwrap_or("unknown").to_string();

    let timestamp_ms =
        payload.timestamp.as_ref().and_then(|ts| ts.to_epoch_ms()).unwrap_or(now_ms);

    let destination = payload.destination_coords.as_ref().and_then(|coords| {
        let lat = coords.latitude.filter(|v| v.is_finite())?;
        let lng = coords.longitude.filter(|v| v.is_finite())?;
        let label = truthy_str(payload.destination.as_deref()).unwrap_or("Unknown destination");
        Some(Destination::new(lat, lng, label))
    });

    Ok(Reconciled {
        position: Position { lat, lng, timestamp_ms, speed_kmh, heading_deg, accuracy_m },
        is_moving,
        gps_quality,
        destination,
        estimated_time_to_destination_secs: payload.estimated_time_to_destination,
        route_status: payload.route_status,
    })
}

/// Clamp negatives and non-finite values to zero
#[inline]
fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}
