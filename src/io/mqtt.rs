//! MQTT binding of the transport seam
//!
//! The logical channel `asset-tracking:locations` maps to one broker topic
//! per event name, `asset-tracking/locations/<event>`. Once `connect` has
//! been called a background task polls the event loop for the life of the
//! transport and forwards each publish, decoded as JSON, to the sink
//! subscribed for its topic.
//!
//! rumqttc reconnects on the next poll after an error. Sessions are clean,
//! so every subscription is re-issued on each ConnAck the poll task sees.

use crate::domain::types::{ConnectionState, EventTopic, TrackingEvent};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::transport::{Transport, TransportError};
use crate::services::session::{EnqueueError, SessionSender};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Delay before polling again after a broker error
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Broker topic -> (event topic, sink)
type Routes = FxHashMap<String, (EventTopic, SessionSender)>;

/// State shared with the poll task
struct Shared {
    routes: RwLock<Routes>,
    state: Mutex<ConnectionState>,
    /// A connection change was dropped on a full channel; re-send it
    resync: AtomicBool,
    metrics: Arc<Metrics>,
}

impl Shared {
    fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            routes: RwLock::new(FxHashMap::default()),
            state: Mutex::new(ConnectionState::Disconnected),
            resync: AtomicBool::new(false),
            metrics,
        }
    }

    fn state(&self) -> ConnectionState {
        self.state.lock().clone()
    }

    /// Update the state and tell every subscriber once per change
    fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.lock();
        if *state == next {
            return;
        }
        *state = next.clone();
        drop(state);

        self.notify(&next);
    }

    fn notify(&self, state: &ConnectionState) {
        let routes = self.routes.read();
        let mut notified: Vec<&SessionSender> = Vec::new();
        for (_, sink) in routes.values() {
            if notified.iter().any(|s| s.same_channel(sink)) {
                continue;
            }
            notified.push(sink);
            if let Err(EnqueueError::Full) = sink.send_connection(state.clone()) {
                self.metrics.record_connection_update_dropped();
                self.resync.store(true, Ordering::Relaxed);
                warn!(state = %state.as_str(), reason = "channel full", "connection_update_dropped");
            }
        }
    }

    /// Re-send the current state if an earlier change was dropped
    fn resync_if_needed(&self) {
        if self.resync.swap(false, Ordering::Relaxed) {
            let state = self.state();
            self.notify(&state);
        }
    }

    fn routed_topics(&self) -> Vec<String> {
        self.routes.read().keys().cloned().collect()
    }
}

/// MQTT transport built on rumqttc
pub struct MqttTransport {
    options: MqttOptions,
    channel: String,
    connect_timeout: Duration,
    shared: Arc<Shared>,
    client: Option<AsyncClient>,
    poll_task: Option<JoinHandle<()>>,
}

impl MqttTransport {
    pub fn new(config: &Config, metrics: Arc<Metrics>) -> Self {
        let client_id = config
            .transport_client_id()
            .map(str::to_string)
            .unwrap_or_else(|| format!("asset-tracker-{}", std::process::id()));
        let mut options =
            MqttOptions::new(client_id, config.transport_host(), config.transport_port());
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs()));
        options.set_clean_session(true);

        // Set credentials if configured
        if let (Some(username), Some(password)) =
            (config.transport_username(), config.transport_password())
        {
            options.set_credentials(username, password);
        }

        Self {
            options,
            channel: config.transport_channel().to_string(),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms()),
            shared: Arc::new(Shared::new(metrics)),
            client: None,
            poll_task: None,
        }
    }

    /// Broker topic for an event on the configured channel
    pub fn topic_for(&self, topic: EventTopic) -> String {
        broker_topic(&self.channel, topic)
    }
}

/// `asset-tracking:locations` + location-update -> `asset-tracking/locations/location-update`
pub fn broker_topic(channel: &str, topic: EventTopic) -> String {
    format!("{}/{}", channel.replace(':', "/"), topic.as_str())
}

/// Wait for the broker's ConnAck, polling the event loop
async fn await_connack(eventloop: &mut EventLoop) -> Result<(), TransportError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
            Ok(_) => {}
            Err(e) => return Err(TransportError::ConnectFailed(e.to_string())),
        }
    }
}

/// Queue a subscribe for every routed topic; the broker forgot them with the old session
fn restore_subscriptions(client: &AsyncClient, shared: &Shared) {
    for topic in shared.routed_topics() {
        match client.try_subscribe(topic.as_str(), QoS::AtMostOnce) {
            Ok(()) => debug!(topic = %topic, "mqtt_resubscribed"),
            Err(e) => warn!(topic = %topic, error = %e, "mqtt_resubscribe_failed"),
        }
    }
}

/// Poll until aborted, forwarding publishes to their sinks
async fn poll_loop(mut eventloop: EventLoop, client: AsyncClient, shared: Arc<Shared>) {
    // Rate-limit drop warnings to 1 per second
    let mut last_drop_warn = Instant::now() - Duration::from_secs(2);

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let route = shared.routes.read().get(publish.topic.as_str()).cloned();
                let Some((topic, sink)) = route else {
                    debug!(topic = %publish.topic, "mqtt_unrouted_publish");
                    continue;
                };

                let payload = match serde_json::from_slice::<serde_json::Value>(&publish.payload) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(topic = %publish.topic, error = %e, "mqtt_invalid_payload");
                        continue;
                    }
                };

                match sink.try_send_event(TrackingEvent::new(topic, payload)) {
                    Ok(()) => shared.resync_if_needed(),
                    Err(EnqueueError::Full) => {
                        shared.metrics.record_event_dropped();
                        if last_drop_warn.elapsed() > Duration::from_secs(1) {
                            warn!(topic = %topic, reason = "channel full", "mqtt_event_dropped");
                            last_drop_warn = Instant::now();
                        }
                    }
                    Err(EnqueueError::Closed) => {
                        info!(reason = "session channel closed", "mqtt_poll_stopped");
                        return;
                    }
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("mqtt_reconnected");
                shared.set_state(ConnectionState::Connected);
                restore_subscriptions(&client, &shared);
            }
            Ok(_) => {}
            Err(e) => {
                // Only a live connection moves through suspended; failed retries keep the state
                let was_up = matches!(
                    shared.state(),
                    ConnectionState::Connected | ConnectionState::Connecting
                );
                if was_up {
                    error!(error = %e, "mqtt_connection_lost");
                    shared.set_state(ConnectionState::Suspended);
                } else {
                    debug!(error = %e, "mqtt_reconnect_failed");
                }
                tokio::time::sleep(RETRY_DELAY).await;
                if was_up {
                    shared.set_state(ConnectionState::Disconnected);
                }
            }
        }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    /// Open the connection and start the poll task
    ///
    /// The poll task starts even when the first attempt fails and keeps
    /// retrying; the state then reads `Error` until a ConnAck arrives.
    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.client.is_some() {
            return match self.shared.state() {
                ConnectionState::Connected => Ok(()),
                state => Err(TransportError::ConnectFailed(format!(
                    "still reconnecting ({})",
                    state.as_str()
                ))),
            };
        }
        self.shared.set_state(ConnectionState::Connecting);

        let (client, mut eventloop) = AsyncClient::new(self.options.clone(), 100);
        let timeout_ms = self.connect_timeout.as_millis() as u64;
        let result = match tokio::time::timeout(self.connect_timeout, await_connack(&mut eventloop)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::ConnectTimeout(timeout_ms)),
        };

        // State is settled before the poll task can report a later ConnAck
        match &result {
            Ok(()) => {
                let (host, port) = self.options.broker_address();
                info!(host = %host, port = %port, channel = %self.channel, "mqtt_connected");
                self.shared.set_state(ConnectionState::Connected);
            }
            Err(e) => {
                warn!(error = %e, retry_ms = %RETRY_DELAY.as_millis(), "mqtt_connect_failed");
                self.shared.set_state(ConnectionState::Error(e.to_string()));
            }
        }

        self.poll_task = Some(tokio::spawn(poll_loop(eventloop, client.clone(), self.shared.clone())));
        self.client = Some(client);
        result
    }

    /// Route `topic` to `sink` and subscribe
    ///
    /// Works while the broker is unreachable; the subscription is queued and
    /// re-issued when the connection comes up.
    async fn subscribe(
        &mut self,
        topic: EventTopic,
        sink: SessionSender,
    ) -> Result<(), TransportError> {
        let client = self.client.as_ref().ok_or(TransportError::NotConnected)?;
        let broker_topic = self.topic_for(topic);

        // Route before subscribing so no retained message is missed
        self.shared.routes.write().insert(broker_topic.clone(), (topic, sink));
        if let Err(e) = client.subscribe(broker_topic.as_str(), QoS::AtMostOnce).await {
            self.shared.routes.write().remove(&broker_topic);
            return Err(TransportError::SubscribeFailed {
                topic: broker_topic,
                reason: e.to_string(),
            });
        }

        info!(topic = %broker_topic, "mqtt_subscribed");
        Ok(())
    }

    fn connection_state(&self) -> ConnectionState {
        self.shared.state()
    }

    async fn disconnect(&mut self) {
        let topics: Vec<String> = self.shared.routes.write().drain().map(|(topic, _)| topic).collect();
        if let Some(client) = self.client.take() {
            for topic in topics {
                if let Err(e) = client.unsubscribe(topic.as_str()).await {
                    debug!(topic = %topic, error = %e, "mqtt_unsubscribe_failed");
                }
            }
            if let Err(e) = client.disconnect().await {
                debug!(error = %e, "mqtt_disconnect_failed");
            }
        }
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
        *self.shared.state.lock() = ConnectionState::Disconnected;
        info!("mqtt_disconnected");
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
    }
}
