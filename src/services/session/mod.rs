//! Tracking session: the per-asset orchestrator
//!
//! The session owns every piece of tracking state for one asset and is the
//! only thing that mutates it. Transport events, connection changes and
//! animation ticks all arrive as `SessionInput` on one bounded channel and
//! are handled one at a time by `run`, so handlers never interleave.
//!
//! Two positions are kept apart:
//! - `current_position` is canonical and is replaced as soon as a fix is
//!   accepted
//! - `rendered_position` is where the marker was last committed; it trails
//!   the canonical one while an animation is in flight

mod handlers;
#[cfg(test)]
mod tests;
mod views;

use crate::domain::payload::RouteInfo;
use crate::domain::trail::TrailBuffer;
use crate::domain::types::{
    ArrivalStatus, ConnectionState, Destination, EventTopic, LatLng, Position, Route,
    TrackingEvent,
};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::renderer::Renderer;
use crate::io::transport::Transport;
use crate::services::animation::{
    AnimationDriver, Clock, RunId, SystemClock, TickScheduler, TokioTickScheduler,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

pub use views::{format_elapsed, format_eta};

/// Everything the session loop consumes
#[derive(Debug)]
pub enum SessionInput {
    /// Payload delivered by the transport on one of the event topics
    Event(TrackingEvent),
    /// Transport connection change
    Connection(ConnectionState),
    /// Animation tick for the given run
    AnimationTick(RunId),
}

/// Why an event could not be queued for the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// Channel full; the event was dropped
    Full,
    /// Session loop has gone away
    Closed,
}

/// Sender handle into the session loop
///
/// Clone this to share between the transport and the tick scheduler.
#[derive(Clone, Debug)]
pub struct SessionSender {
    tx: mpsc::Sender<SessionInput>,
}

impl SessionSender {
    pub fn new(tx: mpsc::Sender<SessionInput>) -> Self {
        Self { tx }
    }

    /// Queue an input, waiting for room; false once the loop is gone
    pub async fn send(&self, input: SessionInput) -> bool {
        self.tx.send(input).await.is_ok()
    }

    /// Queue a transport event without waiting
    pub fn try_send_event(&self, event: TrackingEvent) -> Result<(), EnqueueError> {
        self.tx.try_send(SessionInput::Event(event)).map_err(|e| match e {
            TrySendError::Full(_) => EnqueueError::Full,
            TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    /// Report a connection change without waiting
    pub fn send_connection(&self, state: ConnectionState) -> Result<(), EnqueueError> {
        self.tx.try_send(SessionInput::Connection(state)).map_err(|e| match e {
            TrySendError::Full(_) => EnqueueError::Full,
            TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Both handles feed the same session
    pub fn same_channel(&self, other: &SessionSender) -> bool {
        self.tx.same_channel(&other.tx)
    }
}

/// Create the session input channel
pub fn create_session_channel(
    buffer_size: usize,
) -> (SessionSender, mpsc::Receiver<SessionInput>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (SessionSender::new(tx), rx)
}

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Constructed, transport not yet opened
    Idle,
    /// Accepting events
    Running,
    /// Torn down; terminal
    Stopped,
}

/// Movement signals adopted alongside each accepted fix
#[derive(Debug, Clone, PartialEq)]
pub struct MovementSignals {
    pub is_moving: bool,
    pub speed_kmh: f64,
    pub heading_deg: f64,
    pub gps_quality: String,
}

impl Default for MovementSignals {
    fn default() -> Self {
        Self { is_moving: false, speed_kmh: 0.0, heading_deg: 0.0, gps_quality: "unknown".into() }
    }
}

/// Display fields from the latest location payload, with status merged in
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationSnapshot {
    pub estimated_time_to_destination_secs: Option<f64>,
    pub route_status: Option<String>,
    pub status: Option<String>,
    pub status_timestamp_ms: Option<u64>,
}

/// Per-asset tracking state and pipeline
pub struct TrackingSession {
    pub(crate) config: Config,
    pub(crate) metrics: Arc<Metrics>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) transport: Box<dyn Transport>,
    /// Handed to the transport on subscribe
    pub(crate) inbound: SessionSender,
    pub(crate) renderer: Option<Box<dyn Renderer>>,
    pub(crate) animation: AnimationDriver,
    pub(crate) trail: TrailBuffer,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) current_position: Option<Position>,
    pub(crate) previous_position: Option<Position>,
    pub(crate) rendered_position: Option<Position>,
    pub(crate) destination: Option<Destination>,
    pub(crate) route: Route,
    pub(crate) route_info: Option<RouteInfo>,
    pub(crate) arrival_status: Option<ArrivalStatus>,
    pub(crate) connection: ConnectionState,
    pub(crate) signals: MovementSignals,
    pub(crate) snapshot: Option<LocationSnapshot>,
    pub(crate) current_status: Option<String>,
    pub(crate) status_timestamp_ms: Option<u64>,
    /// Local time of the last accepted fix (epoch ms)
    pub(crate) last_update_ms: Option<u64>,
    /// Where the view was last centered
    pub(crate) last_focus: Option<LatLng>,
}

impl TrackingSession {
    /// Create an idle session
    ///
    /// Animation ticks are scheduled on the tokio runtime and delivered
    /// through `inbound`; use `with_animation` to drive them by hand.
    pub fn new(
        config: Config,
        metrics: Arc<Metrics>,
        transport: Box<dyn Transport>,
        inbound: SessionSender,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let animation = AnimationDriver::new(
            clock.clone(),
            Box::new(TokioTickScheduler::new(inbound.clone())),
            Duration::from_millis(config.frame_interval_ms()),
        );
        let trail = TrailBuffer::with_min_spacing(config.max_trail_length(), config.min_trail_spacing_m());

        Self {
            config,
            metrics,
            clock,
            transport,
            inbound,
            renderer: None,
            animation,
            trail,
            lifecycle: Lifecycle::Idle,
            current_position: None,
            previous_position: None,
            rendered_position: None,
            destination: None,
            route: Route::new(),
            route_info: None,
            arrival_status: None,
            connection: ConnectionState::Disconnected,
            signals: MovementSignals::default(),
            snapshot: None,
            current_status: None,
            status_timestamp_ms: None,
            last_update_ms: None,
            last_focus: None,
        }
    }

    /// Attach a rendering sink; without one every fix is committed directly
    pub fn with_renderer(mut self, renderer: Box<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Replace the clock and tick scheduler
    pub fn with_animation(mut self, clock: Arc<dyn Clock>, scheduler: Box<dyn TickScheduler>) -> Self {
        self.animation = AnimationDriver::new(
            clock.clone(),
            scheduler,
            Duration::from_millis(self.config.frame_interval_ms()),
        );
        self.clock = clock;
        self
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Open the transport and subscribe to every event topic
    ///
    /// Never fails: connect and subscribe errors end up in the connection
    /// state and the session still runs. Subscriptions are requested even
    /// after a failed connect so they are in place when the transport's
    /// retries reach the broker.
    pub async fn start(&mut self) {
        if self.lifecycle != Lifecycle::Idle {
            warn!(lifecycle = ?self.lifecycle, "session_start_ignored");
            return;
        }

        self.connection = ConnectionState::Connecting;
        info!(asset = %self.config.site_id(), channel = %self.config.transport_channel(), "session_starting");

        let connected = match self.transport.connect().await {
            Ok(()) => {
                self.connection = self.transport.connection_state();
                true
            }
            Err(e) => {
                warn!(error = %e, "transport_connect_failed");
                self.connection = ConnectionState::Error(e.to_string());
                false
            }
        };

        for topic in EventTopic::ALL {
            if let Err(e) = self.transport.subscribe(topic, self.inbound.clone()).await {
                warn!(topic = %topic, error = %e, "subscribe_failed");
                // Keep the connect error if there was one
                if connected {
                    self.connection = ConnectionState::Error(e.to_string());
                }
            }
        }

        self.lifecycle = Lifecycle::Running;
        info!(connection = %self.connection.as_str(), "session_started");
    }

    /// Tear down: cancel animation, release the transport
    ///
    /// Safe to call repeatedly and before `start`.
    pub async fn stop(&mut self) {
        if self.lifecycle == Lifecycle::Stopped {
            return;
        }
        let was_running = self.lifecycle == Lifecycle::Running;
        self.lifecycle = Lifecycle::Stopped;

        self.animation.cancel();
        if was_running {
            self.transport.disconnect().await;
        }
        self.connection = ConnectionState::Disconnected;
        info!(asset = %self.config.site_id(), "session_stopped");
    }

    /// Consume session inputs until shutdown or until the channel closes
    ///
    /// Call after `start`. Stops the session on exit.
    pub async fn run(
        &mut self,
        mut rx: mpsc::Receiver<SessionInput>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        debug_assert!(
            self.lifecycle == Lifecycle::Running,
            "TrackingSession::run called before start"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("session_shutdown");
                        break;
                    }
                }
                input = rx.recv() => {
                    match input {
                        Some(input) => self.handle_input(input),
                        None => break,
                    }
                }
            }
        }

        self.stop().await;
    }

    /// Handle one input to completion
    pub fn handle_input(&mut self, input: SessionInput) {
        if self.lifecycle == Lifecycle::Stopped {
            debug!(input = ?input, "input_after_stop_ignored");
            return;
        }

        match input {
            SessionInput::Event(event) => {
                let started = Instant::now();
                self.metrics.record_event_received(event.topic);
                self.dispatch_event(&event);
                self.metrics.record_event_processed(started.elapsed().as_micros() as u64);
            }
            SessionInput::Connection(state) => {
                if state != self.connection {
                    info!(from = %self.connection.as_str(), to = %state.as_str(), "connection_changed");
                }
                self.connection = state;
            }
            SessionInput::AnimationTick(run) => self.on_animation_tick(run),
        }
    }

    fn dispatch_event(&mut self, event: &TrackingEvent) {
        match event.topic {
            EventTopic::LocationUpdate => {
                // Rejections are logged and counted by the handler
                let _ = self.apply_location_event(&event.payload);
            }
            EventTopic::RouteUpdate => self.apply_route_event(&event.payload),
            EventTopic::ArrivalNotification => self.apply_arrival_event(&event.payload),
            EventTopic::StatusUpdate => self.apply_status_event(&event.payload),
        }
    }
}
