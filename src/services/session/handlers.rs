//! Event handlers and state-changing operations for TrackingSession

use super::{LocationSnapshot, MovementSignals, TrackingSession};
use crate::domain::geo::distance_meters;
use crate::domain::payload::{decode_object, truthy_str, ArrivalPayload, RouteUpdatePayload, StatusPayload};
use crate::domain::trail::TrailPoint;
use crate::domain::types::{ArrivalStatus, Destination, LatLng, Position, Route};
use crate::io::renderer::{TrailStyle, ViewHint};
use crate::services::animation::{compute_duration, RunId, TickOutcome};
use crate::services::reconciler::{reconcile, InvalidPositionData};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Zoom used when the view follows the asset
const FOLLOW_ZOOM: u8 = 13;
/// Zoom used when explicitly centering on the asset
const CENTER_ZOOM: u8 = 15;
/// Padding around fitted bounds (px)
const FIT_PADDING_PX: u32 = 50;

impl TrackingSession {
    /// Accept or reject one `location-update` payload
    ///
    /// On rejection nothing changes. On success the new fix becomes the
    /// canonical position immediately, the trail is extended, and the marker
    /// either animates toward it or jumps there.
    pub fn apply_location_event(&mut self, payload: &Value) -> Result<(), InvalidPositionData> {
        let now = self.clock.now_ms();
        let reconciled = match reconcile(payload, now) {
            Ok(r) => r,
            Err(reason) => {
                self.metrics.record_location_rejected();
                warn!(reason = %reason, payload = %payload, "location_rejected");
                return Err(reason);
            }
        };
        self.metrics.record_location_accepted();

        // Route for an embedded destination starts at the previous fix
        if let Some(destination) = reconciled.destination.clone() {
            self.set_destination(Some(destination));
        }

        self.snapshot = Some(LocationSnapshot {
            estimated_time_to_destination_secs: reconciled.estimated_time_to_destination_secs,
            route_status: reconciled.route_status.clone(),
            status: None,
            status_timestamp_ms: None,
        });
        self.last_update_ms = Some(now);
        self.signals = MovementSignals {
            is_moving: reconciled.is_moving,
            speed_kmh: reconciled.speed_kmh(),
            heading_deg: reconciled.heading_deg(),
            gps_quality: reconciled.gps_quality.clone(),
        };

        let position = reconciled.position;
        if self.current_position.is_some() {
            self.previous_position = self.current_position;
        }
        self.current_position = Some(position);

        let inserted = self.trail.append(TrailPoint::from(&position));
        self.metrics.record_trail_append(inserted);
        if inserted {
            self.push_trail();
        }

        // A fresh fix clears a stale transport error
        if self.connection.is_error() {
            self.connection = self.transport.connection_state();
        }

        debug!(
            position = %position.coords(),
            speed_kmh = %position.speed_kmh,
            heading = %position.heading_deg,
            moving = %self.signals.is_moving,
            "location_accepted"
        );

        self.present(position, None);
        Ok(())
    }

    /// Replace route metadata; recompute the route when one is flagged
    pub fn apply_route_event(&mut self, payload: &Value) {
        let decoded: RouteUpdatePayload = decode_object(payload).unwrap_or_default();
        self.route_info = decoded.route_info;

        let has_route = self.route_info.as_ref().is_some_and(|info| info.has_route);
        if has_route && self.current_position.is_some() && self.destination.is_some() {
            self.update_route();
        }
        debug!(has_route = %has_route, "route_info_updated");
    }

    /// Record an arrival and clear the route
    pub fn apply_arrival_event(&mut self, payload: &Value) {
        let decoded: ArrivalPayload = decode_object(payload).unwrap_or_default();
        let status = ArrivalStatus {
            arrived: true,
            timestamp_ms: decoded.timestamp.as_ref().and_then(|ts| ts.to_epoch_ms()),
            destination_label: decoded.destination,
            final_distance_m: decoded.final_distance,
            journey_duration_secs: decoded.journey_duration,
            arrival_time_iso: decoded.arrival_time,
        };

        info!(
            asset = %self.config.site_id(),
            destination = %status.destination_label.as_deref().unwrap_or("unknown"),
            final_distance_m = ?status.final_distance_m,
            journey_duration_secs = ?status.journey_duration_secs,
            "asset_arrived"
        );

        self.arrival_status = Some(status);
        self.route.clear();
        self.push_route();
    }

    /// Update the status label; payloads without a status are ignored
    pub fn apply_status_event(&mut self, payload: &Value) {
        let decoded: StatusPayload = decode_object(payload).unwrap_or_default();
        let Some(status) = truthy_str(decoded.status.as_deref()) else {
            return;
        };
        let timestamp_ms = decoded.timestamp.as_ref().and_then(|ts| ts.to_epoch_ms());

        self.current_status = Some(status.to_string());
        self.status_timestamp_ms = timestamp_ms;
        let snapshot = self.snapshot.get_or_insert_with(LocationSnapshot::default);
        snapshot.status = Some(status.to_string());
        snapshot.status_timestamp_ms = timestamp_ms;
        debug!(status = %status, "status_updated");
    }

    /// Replace the destination and recompute the route
    ///
    /// `None` clears both destination and route.
    pub fn set_destination(&mut self, destination: Option<Destination>) {
        self.destination = destination;
        self.update_route();
        if let Some(renderer) = &self.renderer {
            renderer.show_destination(self.destination.as_ref());
        }
        debug!(
            destination = %self.destination.as_ref().map(|d| d.address.as_str()).unwrap_or("none"),
            "destination_set"
        );
    }

    /// Forget the last arrival
    pub fn reset_arrival_status(&mut self) {
        self.arrival_status = None;
    }

    /// Empty the trail
    pub fn clear_trail(&mut self) {
        self.trail.clear();
        self.push_trail();
    }

    /// Ask the renderer to show the current position and destination together
    pub fn fit_bounds(&mut self) {
        let points: Vec<LatLng> = self
            .current_position
            .iter()
            .map(Position::coords)
            .chain(self.destination.iter().map(Destination::coords))
            .collect();
        if points.is_empty() {
            return;
        }
        if let Some(renderer) = &self.renderer {
            renderer.set_view(ViewHint::FitBounds { points, padding_px: FIT_PADDING_PX });
        }
    }

    /// Center the view on the current position
    pub fn center_on_current(&mut self) {
        let Some(position) = self.current_position else {
            return;
        };
        self.last_focus = Some(position.coords());
        if let Some(renderer) = &self.renderer {
            renderer.set_view(ViewHint::Focus { center: position.coords(), zoom: CENTER_ZOOM });
        }
    }

    /// Move the marker to `position`, animating over `duration_ms`
    ///
    /// Defaults to the configured base animation speed. Canonical state is
    /// not touched; this only moves what is rendered.
    pub fn animate_to(&mut self, position: Position, duration_ms: Option<u64>) {
        let duration = duration_ms.unwrap_or(self.config.animation_speed_ms());
        self.present(position, Some(duration));
    }

    /// Route is the straight line from the current position to the destination
    pub(crate) fn update_route(&mut self) {
        self.route = match (self.current_position, &self.destination) {
            (Some(start), Some(end)) => Route::from_buf([start.coords(), end.coords()]),
            _ => Route::new(),
        };
        self.push_route();
    }

    /// Deliver one animation tick
    pub(crate) fn on_animation_tick(&mut self, run: RunId) {
        match self.animation.tick(run) {
            TickOutcome::Stale => {}
            TickOutcome::Frame(point) => {
                if let Some(renderer) = &self.renderer {
                    renderer.move_marker(point, self.signals.heading_deg);
                }
            }
            TickOutcome::Completed(target) => {
                self.metrics.record_animation_completed();
                self.commit_rendered(target);
            }
        }
    }

    /// Get `position` onto the screen: animate when possible, else commit
    ///
    /// An in-flight run is superseded, never queued behind.
    fn present(&mut self, position: Position, duration_ms: Option<u64>) {
        let can_animate = self.renderer.is_some() && self.config.animation_enabled();
        let from = self.animation.current_point().or(self.rendered_position.map(|p| p.coords()));

        let Some(from) = from.filter(|_| can_animate) else {
            self.metrics.record_immediate_commit();
            self.commit_rendered(position);
            return;
        };

        let duration = duration_ms
            .unwrap_or_else(|| compute_duration(from, position.coords(), self.signals.speed_kmh));
        match self.animation.begin(from, position, duration) {
            Ok(begin) => self.metrics.record_animation_started(begin.superseded.is_some()),
            Err(fault) => {
                self.metrics.record_animation_fault();
                warn!(fault = %fault, "animation_fault");
                self.metrics.record_immediate_commit();
                self.commit_rendered(position);
            }
        }
    }

    /// Make `position` the rendered position and refocus if it moved far
    fn commit_rendered(&mut self, position: Position) {
        self.rendered_position = Some(position);
        let Some(renderer) = &self.renderer else {
            return;
        };
        renderer.move_marker(position.coords(), position.heading_deg);

        let far = self
            .last_focus
            .map_or(true, |focus| distance_meters(focus, position.coords()) > self.config.recenter_distance_m());
        if far {
            self.last_focus = Some(position.coords());
            renderer.set_view(ViewHint::Focus { center: position.coords(), zoom: FOLLOW_ZOOM });
        }
    }

    fn push_trail(&self) {
        if let Some(renderer) = &self.renderer {
            renderer.draw_trail(&self.trail.path(), TrailStyle::for_class(self.trail.style_hint()));
        }
    }

    fn push_route(&self) {
        if let Some(renderer) = &self.renderer {
            renderer.draw_route(&self.route);
        }
    }
}
