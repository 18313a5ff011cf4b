//! Wire shapes of inbound event payloads
//!
//! Producers send loosely-typed JSON: fields may be missing, null, or of the
//! wrong type. Every optional field is decoded leniently (a field that fails
//! to decode is treated as absent) so one bad field never discards the rest
//! of the payload. Flags follow truthiness rules: `0`, `""`, `null` and
//! `false` are all "not set".

use crate::domain::types::TimestampValue;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Decode a field, treating any type mismatch as absent
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Decode a field by truthiness
fn truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(is_truthy(&value))
}

/// Truthiness of an arbitrary JSON value
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// A number that counts as "set": present, non-zero and not NaN
#[inline]
pub fn truthy_number(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v != 0.0 && !v.is_nan())
}

/// A string that counts as "set": present and non-empty
#[inline]
pub fn truthy_str(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

/// Embedded destination coordinates
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CoordsPayload {
    #[serde(default, deserialize_with = "lenient")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub longitude: Option<f64>,
}

/// `location-update` payload
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationPayload {
    #[serde(default, deserialize_with = "lenient")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub longitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub timestamp: Option<TimestampValue>,
    /// Speed already in km/h
    #[serde(default, deserialize_with = "lenient")]
    pub speed_kmh: Option<f64>,
    /// Raw speed in m/s
    #[serde(default, deserialize_with = "lenient")]
    pub speed: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub heading: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub accuracy: Option<f64>,
    #[serde(default, deserialize_with = "truthy")]
    pub is_moving: bool,
    #[serde(default, deserialize_with = "lenient")]
    pub movement_status: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub gps_quality: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub destination_coords: Option<CoordsPayload>,
    /// Label for `destination_coords`
    #[serde(default, deserialize_with = "lenient")]
    pub destination: Option<String>,
    /// Remaining travel time in seconds, as estimated by the producer
    #[serde(default, deserialize_with = "lenient")]
    pub estimated_time_to_destination: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub route_status: Option<String>,
}

/// Route metadata carried by `route-update`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteInfo {
    #[serde(default, deserialize_with = "truthy")]
    pub has_route: bool,
    /// Producer-specific fields kept for display
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// `route-update` payload
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteUpdatePayload {
    #[serde(default, deserialize_with = "lenient")]
    pub route_info: Option<RouteInfo>,
}

/// `arrival-notification` payload
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrivalPayload {
    #[serde(default, deserialize_with = "lenient")]
    pub timestamp: Option<TimestampValue>,
    #[serde(default, deserialize_with = "lenient")]
    pub destination: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub final_distance: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub journey_duration: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub arrival_time: Option<String>,
}

/// `status-update` payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusPayload {
    #[serde(default, deserialize_with = "lenient")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub timestamp: Option<TimestampValue>,
}

/// Decode an object payload; anything that is not a JSON object yields `None`
pub fn decode_object<T: DeserializeOwned>(value: &Value) -> Option<T> {
    if !value.is_object() {
        return None;
    }
    serde_json::from_value(value.clone()).ok()
}
