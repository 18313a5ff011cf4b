//! Shared types for the asset tracker

use serde::{Deserialize, Deserializer, Serialize};
use smallvec::SmallVec;
use std::time::{SystemTime, UNIX_EPOCH};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// A bare coordinate pair in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    #[inline]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

impl std::fmt::Display for LatLng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6},{:.6}", self.lat, self.lng)
    }
}

/// Canonical position record
///
/// Produced only by the reconciler; never mutated after it is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
    /// Source timestamp (epoch ms), local wall clock when the source sent none
    pub timestamp_ms: u64,
    /// Always >= 0
    pub speed_kmh: f64,
    /// Normalized to [0, 360)
    pub heading_deg: f64,
    /// Always >= 0
    pub accuracy_m: f64,
}

impl Position {
    #[inline]
    pub fn coords(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

/// Where the asset is heading
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Destination {
    pub lat: f64,
    pub lng: f64,
    pub address: String,
}

impl Destination {
    pub fn new(lat: f64, lng: f64, address: impl Into<String>) -> Self {
        Self { lat, lng, address: address.into() }
    }

    /// Destination without a label, shown as "Unknown"
    pub fn unlabeled(lat: f64, lng: f64) -> Self {
        Self::new(lat, lng, "Unknown")
    }

    #[inline]
    pub fn coords(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

/// Direct-line route placeholder: empty, or exactly [start, end]
pub type Route = SmallVec<[LatLng; 2]>;

/// Details of a reported arrival
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArrivalStatus {
    pub arrived: bool,
    pub timestamp_ms: Option<u64>,
    pub destination_label: Option<String>,
    pub final_distance_m: Option<f64>,
    pub journey_duration_secs: Option<f64>,
    pub arrival_time_iso: Option<String>,
}

/// Transport connection state as surfaced through the session
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Suspended,
    Error(String),
}

impl ConnectionState {
    pub fn as_str(&self) -> &str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Suspended => "suspended",
            ConnectionState::Error(_) => "error",
        }
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(self, ConnectionState::Error(_))
    }
}

/// Coarse connection view for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Error,
    Connected,
    Disconnected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Error => "error",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
        }
    }
}

/// Movement classification, highest priority first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementStatus {
    Arrived,
    Approaching,
    Moving,
    Stationary,
}

impl MovementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementStatus::Arrived => "arrived",
            MovementStatus::Approaching => "approaching",
            MovementStatus::Moving => "moving",
            MovementStatus::Stationary => "stationary",
        }
    }
}

/// Logical event names on the tracking channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTopic {
    LocationUpdate,
    RouteUpdate,
    ArrivalNotification,
    StatusUpdate,
}

impl EventTopic {
    pub const ALL: [EventTopic; 4] = [
        EventTopic::LocationUpdate,
        EventTopic::RouteUpdate,
        EventTopic::ArrivalNotification,
        EventTopic::StatusUpdate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventTopic::LocationUpdate => "location-update",
            EventTopic::RouteUpdate => "route-update",
            EventTopic::ArrivalNotification => "arrival-notification",
            EventTopic::StatusUpdate => "status-update",
        }
    }
}

impl std::fmt::Display for EventTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventTopic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "location-update" => Ok(EventTopic::LocationUpdate),
            "route-update" => Ok(EventTopic::RouteUpdate),
            "arrival-notification" => Ok(EventTopic::ArrivalNotification),
            "status-update" => Ok(EventTopic::StatusUpdate),
            other => Err(format!("unknown event topic: {other}")),
        }
    }
}

/// Opaque inbound event as delivered by the transport
#[derive(Debug, Clone)]
pub struct TrackingEvent {
    pub topic: EventTopic,
    pub payload: serde_json::Value,
}

impl TrackingEvent {
    pub fn new(topic: EventTopic, payload: serde_json::Value) -> Self {
        Self { topic, payload }
    }
}

/// Timestamp that can be either an RFC 3339 string or epoch milliseconds
#[derive(Debug, Clone, Default, PartialEq)]
pub enum TimestampValue {
    #[default]
    None,
    IsoString(String),
    EpochMs(u64),
}

impl TimestampValue {
    /// Epoch milliseconds, if the value is present and parseable
    pub fn to_epoch_ms(&self) -> Option<u64> {
        match self {
            TimestampValue::EpochMs(0) => None,
            TimestampValue::EpochMs(ms) => Some(*ms),
            TimestampValue::IsoString(s) => parse_iso_time(s),
            TimestampValue::None => None,
        }
    }
}

/// Parse an RFC 3339 timestamp to epoch milliseconds
pub fn parse_iso_time(time_str: &str) -> Option<u64> {
    OffsetDateTime::parse(time_str, &Rfc3339)
        .ok()
        .and_then(|dt| u64::try_from(dt.unix_timestamp_nanos() / 1_000_000).ok())
}

impl<'de> Deserialize<'de> for TimestampValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct TimestampVisitor;

        impl<'de> Visitor<'de> for TimestampVisitor {
            type Value = TimestampValue;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a string or numeric timestamp")
            }

            fn visit_str<E>(self, value: &str) -> Result<TimestampValue, E>
            where
                E: de::Error,
            {
                Ok(TimestampValue::IsoString(value.to_string()))
            }

            fn visit_string<E>(self, value: String) -> Result<TimestampValue, E>
            where
                E: de::Error,
            {
                Ok(TimestampValue::IsoString(value))
            }

            fn visit_u64<E>(self, value: u64) -> Result<TimestampValue, E>
            where
                E: de::Error,
            {
                Ok(TimestampValue::EpochMs(value))
            }

            fn visit_i64<E>(self, value: i64) -> Result<TimestampValue, E>
            where
                E: de::Error,
            {
                Ok(TimestampValue::EpochMs(u64::try_from(value).unwrap_or(0)))
            }

            fn visit_f64<E>(self, value: f64) -> Result<TimestampValue, E>
            where
                E: de::Error,
            {
                if value.is_finite() && value > 0.0 {
                    Ok(TimestampValue::EpochMs(value as u64))
                } else {
                    Ok(TimestampValue::None)
                }
            }

            fn visit_unit<E>(self) -> Result<TimestampValue, E>
            where
                E: de::Error,
            {
                Ok(TimestampValue::None)
            }
        }

        deserializer.deserialize_any(TimestampVisitor)
    }
}
