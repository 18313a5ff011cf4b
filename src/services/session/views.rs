//! Derived, read-only views of session state
//!
//! Nothing here is stored; every value is recomputed from the owned state
//! on each call.

use super::{LocationSnapshot, MovementSignals, TrackingSession};
use crate::domain::geo::{bearing_degrees, distance_meters};
use crate::domain::payload::RouteInfo;
use crate::domain::trail::{round_to, TrailBuffer, TrailStats};
use crate::domain::types::{
    ArrivalStatus, ConnectionState, ConnectionStatus, Destination, LatLng, MovementStatus,
    Position,
};
use crate::io::renderer::TrailStyle;
use crate::services::animation::AnimationState;

/// Elapsed time since the last update, for display
pub fn format_elapsed(last_update_ms: Option<u64>, now_ms: u64) -> String {
    let Some(last) = last_update_ms else {
        return "Never".to_string();
    };
    let diff = now_ms.saturating_sub(last);
    if diff < 60_000 {
        "Just now".to_string()
    } else if diff < 3_600_000 {
        format!("{}m ago", diff / 60_000)
    } else {
        format!("{}h ago", diff / 3_600_000)
    }
}

/// Remaining travel time, for display; `None` when unknown or not positive
pub fn format_eta(seconds: f64) -> Option<String> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return None;
    }
    let total = seconds.floor() as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    Some(if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m")
    } else {
        "<1m".to_string()
    })
}

impl TrackingSession {
    pub fn current_position(&self) -> Option<&Position> {
        self.current_position.as_ref()
    }

    pub fn previous_position(&self) -> Option<&Position> {
        self.previous_position.as_ref()
    }

    /// Where the marker was last committed
    pub fn rendered_position(&self) -> Option<&Position> {
        self.rendered_position.as_ref()
    }

    pub fn destination(&self) -> Option<&Destination> {
        self.destination.as_ref()
    }

    pub fn route(&self) -> &[LatLng] {
        &self.route
    }

    pub fn route_info(&self) -> Option<&RouteInfo> {
        self.route_info.as_ref()
    }

    pub fn trail(&self) -> &TrailBuffer {
        &self.trail
    }

    pub fn arrival_status(&self) -> Option<&ArrivalStatus> {
        self.arrival_status.as_ref()
    }

    pub fn connection_state(&self) -> &ConnectionState {
        &self.connection
    }

    pub fn signals(&self) -> &MovementSignals {
        &self.signals
    }

    pub fn is_moving(&self) -> bool {
        self.signals.is_moving
    }

    pub fn current_speed_kmh(&self) -> f64 {
        self.signals.speed_kmh
    }

    pub fn current_heading_deg(&self) -> f64 {
        self.signals.heading_deg
    }

    pub fn gps_quality(&self) -> &str {
        &self.signals.gps_quality
    }

    pub fn snapshot(&self) -> Option<&LocationSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn current_status(&self) -> Option<&str> {
        self.current_status.as_deref()
    }

    pub fn status_timestamp_ms(&self) -> Option<u64> {
        self.status_timestamp_ms
    }

    pub fn last_update_ms(&self) -> Option<u64> {
        self.last_update_ms
    }

    pub fn is_animating(&self) -> bool {
        self.animation.is_animating()
    }

    pub fn animation_state(&self) -> Option<&AnimationState> {
        self.animation.state()
    }

    pub fn has_destination(&self) -> bool {
        self.destination.is_some()
    }

    pub fn has_route(&self) -> bool {
        !self.route.is_empty()
    }

    pub fn has_trail(&self) -> bool {
        !self.trail.is_empty()
    }

    pub fn has_location(&self) -> bool {
        self.current_position.is_some()
    }

    pub fn distance_to_destination_m(&self) -> Option<f64> {
        let position = self.current_position?;
        let destination = self.destination.as_ref()?;
        Some(distance_meters(position.coords(), destination.coords()))
    }

    /// Kilometers, 2 decimals
    pub fn distance_to_destination_km(&self) -> Option<f64> {
        self.distance_to_destination_m().map(|m| round_to(m / 1000.0, 2))
    }

    /// Initial bearing from the current position to the destination
    pub fn bearing_to_destination(&self) -> Option<f64> {
        let position = self.current_position?;
        let destination = self.destination.as_ref()?;
        Some(bearing_degrees(position.coords(), destination.coords()))
    }

    /// Within the approach radius of the destination
    pub fn is_near_destination(&self) -> bool {
        self.distance_to_destination_m()
            .is_some_and(|d| d <= self.config.approach_radius_m())
    }

    /// Within `threshold_m` of the destination
    pub fn check_arrival_within(&self, threshold_m: f64) -> bool {
        self.distance_to_destination_m().is_some_and(|d| d <= threshold_m)
    }

    /// Within the configured arrival threshold of the destination
    pub fn check_arrival(&self) -> bool {
        self.check_arrival_within(self.config.arrival_threshold_m())
    }

    pub fn movement_status(&self) -> MovementStatus {
        if self.arrival_status.as_ref().is_some_and(|a| a.arrived) {
            MovementStatus::Arrived
        } else if self.is_near_destination() {
            MovementStatus::Approaching
        } else if self.signals.is_moving {
            MovementStatus::Moving
        } else {
            MovementStatus::Stationary
        }
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        match self.connection {
            ConnectionState::Error(_) => ConnectionStatus::Error,
            ConnectionState::Connected => ConnectionStatus::Connected,
            _ => ConnectionStatus::Disconnected,
        }
    }

    /// "Never", "Just now", "Nm ago" or "Nh ago"
    pub fn last_update_formatted(&self) -> String {
        format_elapsed(self.last_update_ms, self.clock.now_ms())
    }

    /// Producer's remaining-time estimate as "Xh Ym", "Ym" or "<1m"
    pub fn estimated_time_to_destination(&self) -> Option<String> {
        self.snapshot
            .as_ref()
            .and_then(|s| s.estimated_time_to_destination_secs)
            .and_then(format_eta)
    }

    pub fn route_status(&self) -> &str {
        self.snapshot
            .as_ref()
            .and_then(|s| s.route_status.as_deref())
            .filter(|s| !s.is_empty())
            .unwrap_or("unknown")
    }

    pub fn trail_stats(&self) -> Option<TrailStats> {
        self.trail.stats()
    }

    pub fn trail_style(&self) -> TrailStyle {
        TrailStyle::for_class(self.trail.style_hint())
    }
}
