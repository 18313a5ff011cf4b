//! Rendering seam
//!
//! The session pushes plain geometry and style tokens out through
//! `Renderer`; it never sees a map library object. Renderers only display
//! what they are given and cannot reach back into session state.

use crate::domain::trail::SpeedClass;
use crate::domain::types::{Destination, LatLng};
use serde::Serialize;

/// Trail stroke weight (px)
pub const TRAIL_STROKE_WEIGHT: u8 = 3;
/// Trail stroke opacity
pub const TRAIL_OPACITY: f32 = 0.7;

/// How to draw the trail
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrailStyle {
    pub class: SpeedClass,
    pub stroke_weight: u8,
    pub opacity: f32,
}

impl TrailStyle {
    pub fn for_class(class: SpeedClass) -> Self {
        Self { class, stroke_weight: TRAIL_STROKE_WEIGHT, opacity: TRAIL_OPACITY }
    }
}

/// Where the view should look
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViewHint {
    /// Center on a point at a zoom level
    Focus { center: LatLng, zoom: u8 },
    /// Show all of these points
    FitBounds { points: Vec<LatLng>, padding_px: u32 },
}

/// Display sink for one tracked asset
pub trait Renderer: Send {
    /// Place the asset marker
    fn move_marker(&self, point: LatLng, heading_deg: f64);
    /// Replace the trail polyline; an empty path clears it
    fn draw_trail(&self, path: &[LatLng], style: TrailStyle);
    /// Replace the route polyline; an empty path clears it
    fn draw_route(&self, path: &[LatLng]);
    /// Show or hide the destination marker
    fn show_destination(&self, destination: Option<&Destination>);
    fn set_view(&self, hint: ViewHint);
}
