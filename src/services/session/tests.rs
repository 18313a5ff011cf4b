use super::*;
use crate::domain::trail::SpeedClass;
use crate::domain::types::{ConnectionStatus, MovementStatus};
use crate::io::renderer::{TrailStyle, ViewHint};
use crate::io::transport::TransportError;
use crate::services::animation::testing::{FakeClock, ManualScheduler};
use crate::services::reconciler::InvalidPositionData;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

const T0: u64 = 1_767_600_000_000;
/// Roughly 111 m of latitude
const STEP: f64 = 0.001;

// ---- test doubles ----

#[derive(Debug, Default)]
struct TransportLog {
    connects: usize,
    subscribed: Vec<EventTopic>,
    disconnects: usize,
    connected: bool,
}

#[derive(Default)]
struct ScriptedTransport {
    log: Arc<Mutex<TransportLog>>,
    connect_error: Option<TransportError>,
    reject_topic: Option<EventTopic>,
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let mut log = self.log.lock();
        log.connects += 1;
        match &self.connect_error {
            Some(e) => Err(e.clone()),
            None => {
                log.connected = true;
                Ok(())
            }
        }
    }

    async fn subscribe(
        &mut self,
        topic: EventTopic,
        _sink: SessionSender,
    ) -> Result<(), TransportError> {
        if self.reject_topic == Some(topic) {
            return Err(TransportError::SubscribeFailed {
                topic: topic.to_string(),
                reason: "not authorized".into(),
            });
        }
        self.log.lock().subscribed.push(topic);
        Ok(())
    }

    fn connection_state(&self) -> ConnectionState {
        if self.log.lock().connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    async fn disconnect(&mut self) {
        let mut log = self.log.lock();
        log.disconnects += 1;
        log.connected = false;
    }
}

#[derive(Debug, Clone, PartialEq)]
enum RenderCall {
    Marker(LatLng),
    Trail(Vec<LatLng>, TrailStyle),
    Route(Vec<LatLng>),
    Destination(Option<String>),
    View(ViewHint),
}

#[derive(Clone, Default)]
struct RecordingRenderer {
    calls: Arc<Mutex<Vec<RenderCall>>>,
}

impl RecordingRenderer {
    fn markers(&self) -> Vec<LatLng> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                RenderCall::Marker(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    fn focus_points(&self) -> Vec<LatLng> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                RenderCall::View(ViewHint::Focus { center, .. }) => Some(*center),
                _ => None,
            })
            .collect()
    }

    fn last_route(&self) -> Option<Vec<LatLng>> {
        self.calls.lock().iter().rev().find_map(|c| match c {
            RenderCall::Route(path) => Some(path.clone()),
            _ => None,
        })
    }

    fn last_trail(&self) -> Option<(Vec<LatLng>, TrailStyle)> {
        self.calls.lock().iter().rev().find_map(|c| match c {
            RenderCall::Trail(path, style) => Some((path.clone(), *style)),
            _ => None,
        })
    }

    fn last_view(&self) -> Option<ViewHint> {
        self.calls.lock().iter().rev().find_map(|c| match c {
            RenderCall::View(hint) => Some(hint.clone()),
            _ => None,
        })
    }
}

impl Renderer for RecordingRenderer {
    fn move_marker(&self, point: LatLng, _heading_deg: f64) {
        self.calls.lock().push(RenderCall::Marker(point));
    }

    fn draw_trail(&self, path: &[LatLng], style: TrailStyle) {
        self.calls.lock().push(RenderCall::Trail(path.to_vec(), style));
    }

    fn draw_route(&self, path: &[LatLng]) {
        self.calls.lock().push(RenderCall::Route(path.to_vec()));
    }

    fn show_destination(&self, destination: Option<&Destination>) {
        self.calls
            .lock()
            .push(RenderCall::Destination(destination.map(|d| d.address.clone())));
    }

    fn set_view(&self, hint: ViewHint) {
        self.calls.lock().push(RenderCall::View(hint));
    }
}

// ---- harness ----

struct Harness {
    session: TrackingSession,
    clock: Arc<FakeClock>,
    scheduler: ManualScheduler,
    renderer: RecordingRenderer,
    metrics: Arc<Metrics>,
    transport: Arc<Mutex<TransportLog>>,
    _rx: mpsc::Receiver<SessionInput>,
}

impl Harness {
    fn build(config: Config, transport: ScriptedTransport, with_renderer: bool) -> Self {
        let clock = FakeClock::at(T0);
        let scheduler = ManualScheduler::default();
        let renderer = RecordingRenderer::default();
        let metrics = Arc::new(Metrics::new());
        let log = transport.log.clone();
        let (tx, rx) = create_session_channel(64);

        let mut session = TrackingSession::new(config, metrics.clone(), Box::new(transport), tx)
            .with_animation(clock.clone(), Box::new(scheduler.clone()));
        if with_renderer {
            session = session.with_renderer(Box::new(renderer.clone()));
        }

        Self { session, clock, scheduler, renderer, metrics, transport: log, _rx: rx }
    }

    fn new() -> Self {
        Self::build(Config::default(), ScriptedTransport::default(), true)
    }

    fn headless() -> Self {
        Self::build(Config::default(), ScriptedTransport::default(), false)
    }

    fn fix(&mut self, lat: f64, lng: f64, speed_kmh: f64) -> Result<(), InvalidPositionData> {
        self.session.apply_location_event(&json!({
            "latitude": lat,
            "longitude": lng,
            "speedKmh": speed_kmh,
            "isMoving": speed_kmh > 0.0
        }))
    }

    /// Deliver ticks until no run is pending, 100 ms apart
    fn finish_animation(&mut self) {
        while let Some(run) = self.scheduler.take_next() {
            self.clock.advance(100);
            self.session.handle_input(SessionInput::AnimationTick(run));
        }
    }
}

fn at(lat: f64, lng: f64) -> LatLng {
    LatLng::new(lat, lng)
}

// ---- location pipeline ----

#[test]
fn test_location_event_canonical_position() {
    let mut h = Harness::headless();
    h.session
        .apply_location_event(&json!({
            "latitude": 40.7128,
            "longitude": -74.0060,
            "speedKmh": 25.5,
            "heading": 45,
            "isMoving": true
        }))
        .unwrap();

    let position = h.session.current_position().unwrap();
    assert_eq!(position.lat, 40.7128);
    assert_eq!(position.lng, -74.0060);
    assert_eq!(position.speed_kmh, 25.5);
    assert_eq!(position.heading_deg, 45.0);
    assert_eq!(position.accuracy_m, 0.0);
    assert!(h.session.is_moving());
    assert_eq!(h.session.current_speed_kmh(), 25.5);
    assert_eq!(h.session.current_heading_deg(), 45.0);
    assert_eq!(h.session.gps_quality(), "unknown");
    assert_eq!(h.session.last_update_ms(), Some(T0));
    assert!(h.session.has_location());
    assert!(h.session.has_trail());
}

#[test]
fn test_missing_longitude_leaves_state_unchanged() {
    let mut h = Harness::new();
    h.fix(40.0, -74.0, 10.0).unwrap();
    let before = *h.session.current_position().unwrap();
    let calls_before = h.renderer.calls.lock().len();

    let result = h.session.apply_location_event(&json!({"latitude": 41.0, "speedKmh": 80}));

    assert_eq!(result, Err(InvalidPositionData::MissingLongitude));
    assert_eq!(h.session.current_position(), Some(&before));
    assert!(h.session.previous_position().is_none());
    assert_eq!(h.session.trail().len(), 1);
    assert_eq!(h.session.current_speed_kmh(), 10.0);
    assert_eq!(h.renderer.calls.lock().len(), calls_before);

    let summary = h.metrics.report();
    assert_eq!(summary.locations_accepted, 1);
    assert_eq!(summary.locations_rejected, 1);
}

#[test]
fn test_previous_position_tracks_last_accepted() {
    let mut h = Harness::headless();
    h.fix(40.0, -74.0, 10.0).unwrap();
    assert!(h.session.previous_position().is_none());

    h.fix(40.0 + STEP, -74.0, 10.0).unwrap();
    assert_eq!(h.session.previous_position().unwrap().lat, 40.0);
    assert_eq!(h.session.current_position().unwrap().lat, 40.0 + STEP);
}

#[test]
fn test_close_fix_updates_position_but_not_trail() {
    let mut h = Harness::headless();
    h.fix(40.0, -74.0, 1.0).unwrap();
    // ~2 m north
    h.fix(40.00002, -74.0, 1.0).unwrap();

    assert_eq!(h.session.current_position().unwrap().lat, 40.00002);
    assert_eq!(h.session.trail().len(), 1);
    let summary = h.metrics.report();
    assert_eq!(summary.trail_appended, 1);
    assert_eq!(summary.trail_skipped, 1);
}

#[test]
fn test_trail_pushed_with_speed_style() {
    let mut h = Harness::new();
    h.fix(40.0, -74.0, 40.0).unwrap();
    h.fix(40.0 + STEP, -74.0, 50.0).unwrap();

    let (path, style) = h.renderer.last_trail().unwrap();
    assert_eq!(path, vec![at(40.0, -74.0), at(40.0 + STEP, -74.0)]);
    assert_eq!(style.class, SpeedClass::Fast);
    assert_eq!(style.stroke_weight, 3);
    assert_eq!(h.session.trail_style().class, SpeedClass::Fast);

    h.session.clear_trail();
    assert!(!h.session.has_trail());
    assert!(h.renderer.last_trail().unwrap().0.is_empty());
}

// ---- animation ----

#[test]
fn test_first_fix_commits_immediately_and_focuses() {
    let mut h = Harness::new();
    h.fix(40.0, -74.0, 10.0).unwrap();

    assert!(!h.session.is_animating());
    assert_eq!(h.session.rendered_position().unwrap().lat, 40.0);
    assert_eq!(h.renderer.markers(), vec![at(40.0, -74.0)]);
    assert_eq!(
        h.renderer.last_view(),
        Some(ViewHint::Focus { center: at(40.0, -74.0), zoom: 13 })
    );
    assert_eq!(h.metrics.report().immediate_commits, 1);
}

#[test]
fn test_second_fix_animates_to_exact_target() {
    let mut h = Harness::new();
    h.fix(40.0, -74.0, 30.0).unwrap();
    h.fix(40.0 + STEP, -74.0, 30.0).unwrap();

    // Canonical position moves at once, the marker follows
    assert!(h.session.is_animating());
    assert_eq!(h.session.current_position().unwrap().lat, 40.0 + STEP);
    assert_eq!(h.session.rendered_position().unwrap().lat, 40.0);

    h.finish_animation();

    assert!(!h.session.is_animating());
    let target = *h.session.current_position().unwrap();
    assert_eq!(h.session.rendered_position(), Some(&target));
    assert_eq!(h.renderer.markers().last(), Some(&target.coords()));

    let summary = h.metrics.report();
    assert_eq!(summary.animations_started, 1);
    assert_eq!(summary.animations_completed, 1);
}

#[test]
fn test_interpolated_frames_move_toward_target() {
    let mut h = Harness::new();
    h.fix(40.0, -74.0, 30.0).unwrap();
    h.fix(40.0 + STEP, -74.0, 30.0).unwrap();

    let mut last_lat = 40.0;
    while let Some(run) = h.scheduler.take_next() {
        h.clock.advance(50);
        h.session.handle_input(SessionInput::AnimationTick(run));
        let lat = h.renderer.markers().last().unwrap().lat;
        assert!(lat >= last_lat && lat <= 40.0 + STEP);
        last_lat = lat;
    }
    assert_eq!(last_lat, 40.0 + STEP);
}

#[test]
fn test_superseding_run_never_commits_abandoned_target() {
    let mut h = Harness::new();
    h.fix(40.0, -74.0, 30.0).unwrap();
    h.fix(40.0 + STEP, -74.0, 30.0).unwrap();
    let abandoned = h.session.current_position().unwrap().coords();

    h.clock.advance(100);
    h.fix(40.0 + 2.0 * STEP, -74.0, 30.0).unwrap();
    let target = *h.session.current_position().unwrap();

    // Exactly one run scheduled; the first run's tick was cancelled
    assert_eq!(h.scheduler.pending(), 1);
    assert_eq!(h.scheduler.cancelled(), 1);
    let state = h.session.animation_state().unwrap();
    assert!(state.start.lat > 40.0 && state.start.lat < abandoned.lat);

    h.finish_animation();

    assert!(!h.session.is_animating());
    assert_eq!(h.session.rendered_position(), Some(&target));
    assert!(!h.renderer.markers().contains(&abandoned));

    let summary = h.metrics.report();
    assert_eq!(summary.animations_started, 2);
    assert_eq!(summary.animations_superseded, 1);
    assert_eq!(summary.animations_completed, 1);
}

#[test]
fn test_stale_tick_after_supersede_is_ignored() {
    let mut h = Harness::new();
    h.fix(40.0, -74.0, 30.0).unwrap();
    h.fix(40.0 + STEP, -74.0, 30.0).unwrap();
    let first_run = h.session.animation_state().unwrap().run;
    h.fix(40.0 + 2.0 * STEP, -74.0, 30.0).unwrap();

    let markers_before = h.renderer.markers().len();
    h.clock.advance(10_000);
    h.session.handle_input(SessionInput::AnimationTick(first_run));

    assert!(h.session.is_animating());
    assert_eq!(h.renderer.markers().len(), markers_before);
}

#[test]
fn test_without_renderer_every_fix_commits_directly() {
    let mut h = Harness::headless();
    h.fix(40.0, -74.0, 30.0).unwrap();
    h.fix(40.0 + STEP, -74.0, 30.0).unwrap();

    assert!(!h.session.is_animating());
    assert_eq!(h.scheduler.pending(), 0);
    assert_eq!(h.session.rendered_position().unwrap().lat, 40.0 + STEP);
    assert_eq!(h.metrics.report().immediate_commits, 2);
}

#[test]
fn test_animation_disabled_commits_directly() {
    let config = Config::default().with_animation_enabled(false);
    let mut h = Harness::build(config, ScriptedTransport::default(), true);
    h.fix(40.0, -74.0, 30.0).unwrap();
    h.fix(40.0 + STEP, -74.0, 30.0).unwrap();

    assert!(!h.session.is_animating());
    assert_eq!(h.renderer.markers(), vec![at(40.0, -74.0), at(40.0 + STEP, -74.0)]);
}

#[test]
fn test_recenter_only_on_large_jumps() {
    let mut h = Harness::new();
    h.fix(40.0, -74.0, 30.0).unwrap();
    h.fix(40.0 + STEP, -74.0, 30.0).unwrap();
    h.finish_animation();
    assert_eq!(h.renderer.focus_points().len(), 1);

    // ~2.2 km away
    h.fix(40.02, -74.0, 30.0).unwrap();
    h.finish_animation();
    assert_eq!(h.renderer.focus_points(), vec![at(40.0, -74.0), at(40.02, -74.0)]);
}

#[test]
fn test_animate_to_uses_configured_base_speed() {
    let config = Config::default().with_animation_speed_ms(750);
    let mut h = Harness::build(config, ScriptedTransport::default(), true);
    h.fix(40.0, -74.0, 0.0).unwrap();

    let goal = Position {
        lat: 40.0 + STEP,
        lng: -74.0,
        timestamp_ms: T0,
        speed_kmh: 0.0,
        heading_deg: 0.0,
        accuracy_m: 0.0,
    };
    h.session.animate_to(goal, None);
    assert_eq!(h.session.animation_state().unwrap().duration_ms, 750);
    // Canonical position is untouched
    assert_eq!(h.session.current_position().unwrap().lat, 40.0);

    h.finish_animation();
    assert_eq!(h.session.rendered_position(), Some(&goal));

    h.session.animate_to(Position { lat: 40.0, ..goal }, Some(200));
    assert_eq!(h.session.animation_state().unwrap().duration_ms, 200);
}

#[test]
fn test_non_finite_animation_target_falls_back_to_commit() {
    let mut h = Harness::new();
    h.fix(40.0, -74.0, 0.0).unwrap();

    let bad = Position {
        lat: f64::NAN,
        lng: -74.0,
        timestamp_ms: T0,
        speed_kmh: 0.0,
        heading_deg: 0.0,
        accuracy_m: 0.0,
    };
    h.session.animate_to(bad, None);

    assert!(!h.session.is_animating());
    assert!(h.session.rendered_position().unwrap().lat.is_nan());
    assert_eq!(h.metrics.report().animation_faults, 1);
}

// ---- destination, route, arrival, status ----

#[test]
fn test_set_destination_builds_and_clears_route() {
    let mut h = Harness::new();
    h.fix(40.0, -74.0, 10.0).unwrap();

    h.session.set_destination(Some(Destination::new(40.01, -74.0, "Depot")));
    assert!(h.session.has_destination());
    assert_eq!(h.session.route(), &[at(40.0, -74.0), at(40.01, -74.0)]);
    assert_eq!(h.renderer.last_route().unwrap().len(), 2);

    h.session.set_destination(None);
    assert!(!h.session.has_destination());
    assert!(!h.session.has_route());
    assert_eq!(h.renderer.last_route(), Some(vec![]));
    assert!(h.renderer.calls.lock().contains(&RenderCall::Destination(None)));
}

#[test]
fn test_destination_without_position_has_no_route() {
    let mut h = Harness::new();
    h.session.set_destination(Some(Destination::unlabeled(40.01, -74.0)));
    assert!(h.session.has_destination());
    assert!(!h.session.has_route());
    assert_eq!(h.session.destination().unwrap().address, "Unknown");
    assert!(h.session.distance_to_destination_m().is_none());
}

#[test]
fn test_embedded_destination_routes_from_previous_fix() {
    let mut h = Harness::headless();
    h.fix(40.0, -74.0, 10.0).unwrap();
    h.session
        .apply_location_event(&json!({
            "latitude": 40.0 + STEP,
            "longitude": -74.0,
            "destinationCoords": {"latitude": 40.01, "longitude": -74.0},
            "destination": "Warehouse 7"
        }))
        .unwrap();

    assert_eq!(h.session.destination().unwrap().address, "Warehouse 7");
    assert_eq!(h.session.route()[0], at(40.0, -74.0));
    assert_eq!(h.session.route()[1], at(40.01, -74.0));
}

#[test]
fn test_route_event_recomputes_only_when_flagged() {
    let mut h = Harness::headless();
    h.session.set_destination(Some(Destination::new(40.01, -74.0, "Depot")));
    h.fix(40.0, -74.0, 10.0).unwrap();
    assert!(!h.session.has_route());

    h.session.apply_route_event(&json!({"routeInfo": {"hasRoute": false, "eta": 300}}));
    assert!(!h.session.has_route());
    assert_eq!(h.session.route_info().unwrap().extra.get("eta"), Some(&json!(300)));

    h.session.apply_route_event(&json!({"routeInfo": {"hasRoute": true}}));
    assert_eq!(h.session.route(), &[at(40.0, -74.0), at(40.01, -74.0)]);

    h.session.apply_route_event(&json!({}));
    assert!(h.session.route_info().is_none());
}

#[test]
fn test_arrival_event_clears_route() {
    let mut h = Harness::new();
    h.fix(40.0, -74.0, 10.0).unwrap();
    h.session.set_destination(Some(Destination::new(40.01, -74.0, "Depot")));
    assert!(h.session.has_route());

    h.session.apply_arrival_event(&json!({
        "destination": "Depot",
        "finalDistance": 12.5,
        "journeyDuration": 600,
        "arrivalTime": "2026-01-05T16:41:30Z",
        "timestamp": T0
    }));

    assert!(h.session.route().is_empty());
    assert_eq!(h.renderer.last_route(), Some(vec![]));
    let arrival = h.session.arrival_status().unwrap();
    assert!(arrival.arrived);
    assert_eq!(arrival.destination_label.as_deref(), Some("Depot"));
    assert_eq!(arrival.final_distance_m, Some(12.5));
    assert_eq!(arrival.journey_duration_secs, Some(600.0));
    assert_eq!(arrival.timestamp_ms, Some(T0));
    assert_eq!(h.session.movement_status(), MovementStatus::Arrived);

    h.session.reset_arrival_status();
    assert!(h.session.arrival_status().is_none());
    assert_ne!(h.session.movement_status(), MovementStatus::Arrived);
}

#[test]
fn test_arrival_with_empty_payload_still_arrives() {
    let mut h = Harness::headless();
    h.session.apply_arrival_event(&Value::Null);
    let arrival = h.session.arrival_status().unwrap();
    assert!(arrival.arrived);
    assert!(arrival.destination_label.is_none());
}

#[test]
fn test_status_event_merges_into_snapshot() {
    let mut h = Harness::headless();
    h.session
        .apply_location_event(&json!({
            "latitude": 40.0,
            "longitude": -74.0,
            "routeStatus": "on_route",
            "estimatedTimeToDestination": 3725
        }))
        .unwrap();

    h.session
        .apply_status_event(&json!({"status": "loading", "timestamp": "2026-01-05T16:41:30Z"}));
    assert_eq!(h.session.current_status(), Some("loading"));
    assert_eq!(h.session.status_timestamp_ms(), Some(1_767_631_290_000));
    let snapshot = h.session.snapshot().unwrap();
    assert_eq!(snapshot.status.as_deref(), Some("loading"));
    assert_eq!(snapshot.route_status.as_deref(), Some("on_route"));

    // Empty status is not an update
    h.session.apply_status_event(&json!({"status": ""}));
    assert_eq!(h.session.current_status(), Some("loading"));

    assert_eq!(h.session.route_status(), "on_route");
    assert_eq!(h.session.estimated_time_to_destination().as_deref(), Some("1h 2m"));
}

// ---- derived views ----

#[test]
fn test_movement_status_priority() {
    let mut h = Harness::headless();
    h.fix(40.0, -74.0, 0.0).unwrap();
    assert_eq!(h.session.movement_status(), MovementStatus::Stationary);

    h.fix(40.0 + STEP, -74.0, 20.0).unwrap();
    assert_eq!(h.session.movement_status(), MovementStatus::Moving);

    // ~89 m away: inside the approach radius
    h.session.set_destination(Some(Destination::new(40.0018, -74.0, "Gate")));
    assert!(h.session.is_near_destination());
    assert_eq!(h.session.movement_status(), MovementStatus::Approaching);

    h.session.apply_arrival_event(&json!({"destination": "Gate"}));
    assert_eq!(h.session.movement_status(), MovementStatus::Arrived);
}

#[test]
fn test_zero_distance_counts_as_near() {
    let mut h = Harness::headless();
    h.fix(40.0, -74.0, 0.0).unwrap();
    h.session.set_destination(Some(Destination::new(40.0, -74.0, "Here")));
    assert_eq!(h.session.distance_to_destination_m(), Some(0.0));
    assert_eq!(h.session.distance_to_destination_km(), Some(0.0));
    assert!(h.session.is_near_destination());
    assert!(h.session.check_arrival());
}

#[test]
fn test_check_arrival_thresholds() {
    let mut h = Harness::headless();
    assert!(!h.session.check_arrival());

    h.fix(40.0, -74.0, 0.0).unwrap();
    // ~67 m north
    h.session.set_destination(Some(Destination::new(40.0006, -74.0, "Dock")));
    assert!(!h.session.check_arrival());
    assert!(h.session.check_arrival_within(100.0));

    let config = Config::default().with_arrival_threshold_m(70.0);
    let mut h = Harness::build(config, ScriptedTransport::default(), false);
    h.fix(40.0, -74.0, 0.0).unwrap();
    h.session.set_destination(Some(Destination::new(40.0006, -74.0, "Dock")));
    assert!(h.session.check_arrival());
}

#[test]
fn test_distance_and_bearing_to_destination() {
    let mut h = Harness::headless();
    h.fix(40.0, -74.0, 0.0).unwrap();
    h.session.set_destination(Some(Destination::new(40.009, -74.0, "North")));

    let km = h.session.distance_to_destination_km().unwrap();
    assert!((km - 1.0).abs() < 0.01, "{km}");
    let bearing = h.session.bearing_to_destination().unwrap();
    assert!(bearing < 0.01 || bearing > 359.99, "{bearing}");
}

#[test]
fn test_last_update_formatted_follows_clock() {
    let mut h = Harness::headless();
    assert_eq!(h.session.last_update_formatted(), "Never");
    h.fix(40.0, -74.0, 0.0).unwrap();
    assert_eq!(h.session.last_update_formatted(), "Just now");
    h.clock.advance(5 * 60_000);
    assert_eq!(h.session.last_update_formatted(), "5m ago");
}

#[test]
fn test_route_status_defaults_to_unknown() {
    let mut h = Harness::headless();
    assert_eq!(h.session.route_status(), "unknown");
    assert!(h.session.estimated_time_to_destination().is_none());
    h.fix(40.0, -74.0, 0.0).unwrap();
    assert_eq!(h.session.route_status(), "unknown");
}

#[test]
fn test_fit_bounds_and_center() {
    let mut h = Harness::new();
    h.session.fit_bounds();
    assert!(h.renderer.last_view().is_none());

    h.fix(40.0, -74.0, 0.0).unwrap();
    h.session.set_destination(Some(Destination::new(40.01, -74.0, "Depot")));
    h.session.fit_bounds();
    assert_eq!(
        h.renderer.last_view(),
        Some(ViewHint::FitBounds {
            points: vec![at(40.0, -74.0), at(40.01, -74.0)],
            padding_px: 50
        })
    );

    h.session.center_on_current();
    assert_eq!(
        h.renderer.last_view(),
        Some(ViewHint::Focus { center: at(40.0, -74.0), zoom: 15 })
    );
}

// ---- lifecycle and connection ----

#[tokio::test]
async fn test_start_subscribes_all_topics() {
    let mut h = Harness::new();
    assert_eq!(h.session.lifecycle(), Lifecycle::Idle);

    h.session.start().await;

    assert_eq!(h.session.lifecycle(), Lifecycle::Running);
    assert_eq!(h.session.connection_state(), &ConnectionState::Connected);
    assert_eq!(h.session.connection_status(), ConnectionStatus::Connected);
    assert_eq!(h.transport.lock().subscribed, EventTopic::ALL.to_vec());

    // A second start is ignored
    h.session.start().await;
    assert_eq!(h.transport.lock().connects, 1);
}

#[tokio::test]
async fn test_connect_failure_is_reported_not_raised() {
    let transport = ScriptedTransport {
        connect_error: Some(TransportError::ConnectTimeout(10_000)),
        ..Default::default()
    };
    let mut h = Harness::build(Config::default(), transport, true);

    h.session.start().await;

    assert_eq!(h.session.lifecycle(), Lifecycle::Running);
    assert_eq!(
        h.session.connection_state(),
        &ConnectionState::Error("connect timed out after 10000 ms".into())
    );
    assert_eq!(h.session.connection_status(), ConnectionStatus::Error);
    // Subscriptions are still requested for when the transport comes back
    assert_eq!(h.transport.lock().subscribed, EventTopic::ALL.to_vec());

    // A delivered fix clears the error
    h.fix(40.0, -74.0, 0.0).unwrap();
    assert_eq!(h.session.connection_status(), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn test_subscribe_failure_is_reported() {
    let transport = ScriptedTransport {
        reject_topic: Some(EventTopic::RouteUpdate),
        ..Default::default()
    };
    let mut h = Harness::build(Config::default(), transport, false);
    h.session.start().await;

    assert_eq!(h.session.connection_status(), ConnectionStatus::Error);
    assert_eq!(h.transport.lock().subscribed.len(), 3);
}

#[tokio::test]
async fn test_stop_is_idempotent_and_silences_ticks() {
    let mut h = Harness::new();
    h.session.start().await;
    h.fix(40.0, -74.0, 30.0).unwrap();
    h.fix(40.0 + STEP, -74.0, 30.0).unwrap();
    let run = h.session.animation_state().unwrap().run;
    let rendered = *h.session.rendered_position().unwrap();

    h.session.stop().await;
    h.session.stop().await;

    assert_eq!(h.session.lifecycle(), Lifecycle::Stopped);
    assert_eq!(h.transport.lock().disconnects, 1);
    assert!(!h.session.is_animating());
    assert_eq!(h.scheduler.pending(), 0);
    assert_eq!(h.session.connection_status(), ConnectionStatus::Disconnected);

    h.clock.advance(10_000);
    h.session.handle_input(SessionInput::AnimationTick(run));
    assert_eq!(h.session.rendered_position(), Some(&rendered));

    // Events after stop are ignored too
    h.session.handle_input(SessionInput::Event(TrackingEvent::new(
        EventTopic::LocationUpdate,
        json!({"latitude": 41.0, "longitude": -73.0}),
    )));
    assert_eq!(h.session.current_position().unwrap().lat, 40.0 + STEP);
}

#[tokio::test]
async fn test_stop_before_start() {
    let mut h = Harness::new();
    h.session.stop().await;
    h.session.stop().await;
    assert_eq!(h.session.lifecycle(), Lifecycle::Stopped);
    assert_eq!(h.transport.lock().disconnects, 0);

    // Cannot be restarted
    h.session.start().await;
    assert_eq!(h.session.lifecycle(), Lifecycle::Stopped);
    assert_eq!(h.transport.lock().connects, 0);
}

#[test]
fn test_handle_input_dispatches_by_topic() {
    let mut h = Harness::headless();
    h.session.handle_input(SessionInput::Event(TrackingEvent::new(
        EventTopic::LocationUpdate,
        json!({"latitude": 40.0, "longitude": -74.0}),
    )));
    h.session.handle_input(SessionInput::Event(TrackingEvent::new(
        EventTopic::StatusUpdate,
        json!({"status": "idle"}),
    )));
    h.session.handle_input(SessionInput::Event(TrackingEvent::new(
        EventTopic::LocationUpdate,
        json!({"latitude": 40.0}),
    )));
    h.session.handle_input(SessionInput::Connection(ConnectionState::Suspended));

    assert!(h.session.has_location());
    assert_eq!(h.session.current_status(), Some("idle"));
    assert_eq!(h.session.connection_state(), &ConnectionState::Suspended);

    let summary = h.metrics.report();
    assert_eq!(summary.location_events, 2);
    assert_eq!(summary.status_events, 1);
    assert_eq!(summary.locations_rejected, 1);
}

#[test]
fn test_session_sender_reports_full_channel() {
    let (tx, _rx) = create_session_channel(1);
    let event = || TrackingEvent::new(EventTopic::StatusUpdate, json!({"status": "x"}));
    assert_eq!(tx.try_send_event(event()), Ok(()));
    assert_eq!(tx.try_send_event(event()), Err(EnqueueError::Full));
}

#[test]
fn test_session_sender_reports_closed_channel() {
    let (tx, rx) = create_session_channel(4);
    drop(rx);
    assert!(tx.is_closed());
    let event = TrackingEvent::new(EventTopic::StatusUpdate, json!({"status": "x"}));
    assert_eq!(tx.try_send_event(event), Err(EnqueueError::Closed));
}
