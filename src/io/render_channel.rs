//! Typed channel for render messages
//!
//! `RenderSender` is a `Renderer` that turns each call into a serializable
//! message on a bounded channel. The session never waits on it: when the
//! channel is full the message is dropped, and the next update supersedes it
//! anyway.

use crate::domain::types::{epoch_ms, Destination, LatLng};
use crate::io::renderer::{Renderer, TrailStyle, ViewHint};
use serde::Serialize;
use tokio::sync::mpsc;

/// Messages for the render publisher
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RenderMessage {
    Marker(MarkerPayload),
    Trail(TrailPayload),
    Route(RoutePayload),
    Destination(DestinationPayload),
    View(ViewPayload),
}

impl RenderMessage {
    /// Topic suffix under the configured render prefix
    pub fn kind(&self) -> &'static str {
        match self {
            RenderMessage::Marker(_) => "marker",
            RenderMessage::Trail(_) => "trail",
            RenderMessage::Route(_) => "route",
            RenderMessage::Destination(_) => "destination",
            RenderMessage::View(_) => "view",
        }
    }

    /// JSON body
    pub fn to_json(&self) -> serde_json::Result<String> {
        match self {
            RenderMessage::Marker(p) => serde_json::to_string(p),
            RenderMessage::Trail(p) => serde_json::to_string(p),
            RenderMessage::Route(p) => serde_json::to_string(p),
            RenderMessage::Destination(p) => serde_json::to_string(p),
            RenderMessage::View(p) => serde_json::to_string(p),
        }
    }
}

/// Marker position and rotation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerPayload {
    pub asset: String,
    /// Timestamp (epoch ms)
    pub ts: u64,
    pub lat: f64,
    pub lng: f64,
    pub heading: f64,
}

/// Trail polyline; empty `path` clears it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrailPayload {
    pub asset: String,
    pub ts: u64,
    pub path: Vec<LatLng>,
    pub style: TrailStyle,
}

/// Route polyline; empty `path` clears it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutePayload {
    pub asset: String,
    pub ts: u64,
    pub path: Vec<LatLng>,
}

/// Destination marker; `None` hides it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DestinationPayload {
    pub asset: String,
    pub ts: u64,
    pub destination: Option<Destination>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewPayload {
    pub asset: String,
    pub ts: u64,
    #[serde(flatten)]
    pub hint: ViewHint,
}

/// Sender handle for render messages
///
/// Non-blocking - if the channel is full, messages are dropped.
#[derive(Clone)]
pub struct RenderSender {
    tx: mpsc::Sender<RenderMessage>,
    asset_id: String,
}

impl RenderSender {
    pub fn new(tx: mpsc::Sender<RenderMessage>, asset_id: String) -> Self {
        Self { tx, asset_id }
    }

    fn send(&self, message: RenderMessage) {
        // Use try_send to avoid blocking - drop if channel full
        let _ = self.tx.try_send(message);
    }
}

impl Renderer for RenderSender {
    fn move_marker(&self, point: LatLng, heading_deg: f64) {
        self.send(RenderMessage::Marker(MarkerPayload {
            asset: self.asset_id.clone(),
            ts: epoch_ms(),
            lat: point.lat,
            lng: point.lng,
            heading: heading_deg,
        }));
    }

    fn draw_trail(&self, path: &[LatLng], style: TrailStyle) {
        self.send(RenderMessage::Trail(TrailPayload {
            asset: self.asset_id.clone(),
            ts: epoch_ms(),
            path: path.to_vec(),
            style,
        }));
    }

    fn draw_route(&self, path: &[LatLng]) {
        self.send(RenderMessage::Route(RoutePayload {
            asset: self.asset_id.clone(),
            ts: epoch_ms(),
            path: path.to_vec(),
        }));
    }

    fn show_destination(&self, destination: Option<&Destination>) {
        self.send(RenderMessage::Destination(DestinationPayload {
            asset: self.asset_id.clone(),
            ts: epoch_ms(),
            destination: destination.cloned(),
        }));
    }

    fn set_view(&self, hint: ViewHint) {
        self.send(RenderMessage::View(ViewPayload {
            asset: self.asset_id.clone(),
            ts: epoch_ms(),
            hint,
        }));
    }
}

/// Create a new render channel pair
///
/// `asset_id` is stamped on every payload for downstream consumers.
pub fn create_render_channel(
    buffer_size: usize,
    asset_id: String,
) -> (RenderSender, mpsc::Receiver<RenderMessage>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (RenderSender::new(tx, asset_id), rx)
}
