//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `transport` - Transport seam the session subscribes through
//! - `mqtt` - MQTT binding of the transport
//! - `renderer` - Rendering sink seam and its primitive shapes
//! - `render_channel` - Typed channel turning renderer calls into messages
//! - `mqtt_render` - MQTT publisher for render messages
//! - `prometheus` - Prometheus metrics HTTP endpoint

pub mod mqtt;
pub mod mqtt_render;
pub mod prometheus;
pub mod render_channel;
pub mod renderer;
pub mod transport;

// Re-export commonly used types
pub use mqtt::MqttTransport;
pub use mqtt_render::MqttRenderPublisher;
pub use render_channel::{create_render_channel, RenderMessage, RenderSender};
pub use renderer::{Renderer, TrailStyle, ViewHint};
pub use transport::{Transport, TransportError};
