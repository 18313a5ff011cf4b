//! MQTT publisher for render messages
//!
//! Publishes each render message as JSON under the configured prefix:
//! - <prefix>/marker - Marker position and heading
//! - <prefix>/trail - Trail polyline and style
//! - <prefix>/route - Route polyline
//! - <prefix>/destination - Destination marker
//! - <prefix>/view - Focus and fit-bounds hints
//!
//! Everything goes out at QoS 0; a lost frame is replaced by the next one.

use crate::infra::config::Config;
use crate::io::render_channel::RenderMessage;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// MQTT publisher actor
///
/// Receives messages from the render channel and publishes them.
pub struct MqttRenderPublisher {
    client: AsyncClient,
    rx: mpsc::Receiver<RenderMessage>,
    topic_prefix: String,
}

impl MqttRenderPublisher {
    /// Create a new publisher; connects to the configured broker
    pub fn new(config: &Config, rx: mpsc::Receiver<RenderMessage>) -> Self {
        let client_id = format!("asset-tracker-render-{}", std::process::id());
        let mut mqttoptions =
            MqttOptions::new(client_id, config.transport_host(), config.transport_port());
        mqttoptions.set_keep_alive(Duration::from_secs(config.keep_alive_secs()));
        mqttoptions.set_clean_session(true);

        // Set credentials if configured
        if let (Some(username), Some(password)) =
            (config.transport_username(), config.transport_password())
        {
            mqttoptions.set_credentials(username, password);
        }

        let (client, eventloop) = AsyncClient::new(mqttoptions, 100);

        // Spawn the eventloop handler
        tokio::spawn(async move {
            let mut eventloop = eventloop;
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("mqtt_render_connected");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "mqtt_render_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Self { client, rx, topic_prefix: config.render_topic_prefix().to_string() }
    }

    /// Run the publisher loop until shutdown
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(prefix = %self.topic_prefix, "mqtt_render_started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("mqtt_render_shutdown");
                        // Drain remaining messages
                        while let Ok(msg) = self.rx.try_recv() {
                            self.publish_message(msg).await;
                        }
                        return;
                    }
                }
                Some(msg) = self.rx.recv() => {
                    self.publish_message(msg).await;
                }
            }
        }
    }

    async fn publish_message(&self, msg: RenderMessage) {
        let topic = render_topic(&self.topic_prefix, &msg);
        let json = match msg.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!(topic = %topic, error = %e, "mqtt_render_encode_failed");
                return;
            }
        };
        if let Err(e) = self.client.publish(&topic, QoS::AtMostOnce, false, json.into_bytes()).await {
            debug!(topic = %topic, error = %e, "mqtt_render_publish_failed");
        }
    }
}

/// `<prefix>/<kind>`
pub fn render_topic(prefix: &str, msg: &RenderMessage) -> String {
    format!("{}/{}", prefix.trim_end_matches('/'), msg.kind())
}
