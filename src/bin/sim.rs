//! Asset Simulator - publishes a moving asset to the location channel
//!
//! Drives one asset along a straight leg toward a destination and publishes
//! the same events a real producer would:
//! - a route update when the leg starts
//! - location updates every `--interval-ms`, carrying the destination
//! - status updates when the asset starts moving and when it is close
//! - an arrival notification at the end
//!
//! Usage:
//!   cargo run --bin asset-sim
//!   cargo run --bin asset-sim -- --from 40.7128,-74.0060 --to 40.7580,-73.9855 --steps 60

use asset_tracker::domain::{bearing_degrees, distance_meters, EventTopic, LatLng};
use asset_tracker::io::mqtt::broker_topic;
use chrono::Utc;
use clap::Parser;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

/// Distance at which the simulator reports `approaching`
const APPROACH_RADIUS_M: f64 = 100.0;
/// How long to wait for the broker before publishing anyway
const CONNECT_WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// CLI Args
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "asset-sim")]
#[command(about = "Publishes a simulated moving asset for local testing")]
struct Args {
    /// MQTT broker host
    #[arg(long, default_value = "localhost")]
    mqtt_host: String,

    /// MQTT broker port
    #[arg(long, default_value = "1883")]
    mqtt_port: u16,

    /// Logical channel name
    #[arg(long, default_value = "asset-tracking:locations")]
    channel: String,

    /// Start point as "lat,lng"
    #[arg(long, default_value = "40.7128,-74.0060", value_parser = parse_point)]
    from: LatLng,

    /// Destination as "lat,lng"
    #[arg(long, default_value = "40.7580,-73.9855", value_parser = parse_point)]
    to: LatLng,

    /// Destination label
    #[arg(long, default_value = "Times Square")]
    label: String,

    /// Number of location updates along the leg
    #[arg(long, default_value = "30")]
    steps: u32,

    /// Delay between location updates (ms)
    #[arg(long, default_value = "1000")]
    interval_ms: u64,
}

fn parse_point(s: &str) -> Result<LatLng, String> {
    let (lat, lng) = s.split_once(',').ok_or_else(|| format!("expected lat,lng, got {s:?}"))?;
    let lat: f64 = lat.trim().parse().map_err(|e| format!("bad latitude: {e}"))?;
    let lng: f64 = lng.trim().parse().map_err(|e| format!("bad longitude: {e}"))?;
    Ok(LatLng::new(lat, lng))
}

// ============================================================================
// Leg
// ============================================================================

/// Straight-line leg sampled in equal steps
struct Leg {
    from: LatLng,
    to: LatLng,
    steps: u32,
    step_interval: Duration,
}

impl Leg {
    /// Point after `step` of `steps`
    fn point(&self, step: u32) -> LatLng {
        let t = f64::from(step.min(self.steps)) / f64::from(self.steps.max(1));
        LatLng::new(
            self.from.lat + (self.to.lat - self.from.lat) * t,
            self.from.lng + (self.to.lng - self.from.lng) * t,
        )
    }

    /// Constant ground speed that covers the leg in the configured time (m/s)
    fn speed_mps(&self) -> f64 {
        let secs = self.step_interval.as_secs_f64() * f64::from(self.steps.max(1));
        if secs > 0.0 {
            distance_meters(self.from, self.to) / secs
        } else {
            0.0
        }
    }

    fn remaining_secs(&self, step: u32) -> f64 {
        self.step_interval.as_secs_f64() * f64::from(self.steps.saturating_sub(step))
    }
}

// ============================================================================
// Payloads
// ============================================================================

fn location_payload(leg: &Leg, step: u32, label: &str) -> Value {
    let point = leg.point(step);
    let moving = step < leg.steps;
    let remaining = distance_meters(point, leg.to);
    json!({
        "latitude": point.lat,
        "longitude": point.lng,
        "timestamp": Utc::now().to_rfc3339(),
        "speed": if moving { leg.speed_mps() } else { 0.0 },
        "heading": bearing_degrees(point, leg.to),
        "accuracy": 5.0,
        "isMoving": moving,
        "gpsQuality": "good",
        "destinationCoords": { "latitude": leg.to.lat, "longitude": leg.to.lng },
        "destination": label,
        "estimatedTimeToDestination": leg.remaining_secs(step),
        "routeStatus": if remaining <= APPROACH_RADIUS_M { "approaching" } else { "on_route" },
    })
}

fn route_payload(leg: &Leg) -> Value {
    json!({
        "routeInfo": {
            "hasRoute": true,
            "distanceMeters": distance_meters(leg.from, leg.to).round(),
            "durationSecs": leg.remaining_secs(0),
        }
    })
}

fn status_payload(status: &str) -> Value {
    json!({ "status": status, "timestamp": Utc::now().timestamp_millis() })
}

fn arrival_payload(leg: &Leg, label: &str, started: Instant) -> Value {
    let now = Utc::now();
    json!({
        "timestamp": now.timestamp_millis(),
        "destination": label,
        "finalDistance": 0.0,
        "journeyDuration": started.elapsed().as_secs(),
        "arrivalTime": now.to_rfc3339(),
        "latitude": leg.to.lat,
        "longitude": leg.to.lng,
    })
}

// ============================================================================
// Publisher
// ============================================================================

struct Publisher {
    client: AsyncClient,
    channel: String,
}

impl Publisher {
    async fn publish(&self, topic: EventTopic, payload: &Value) -> anyhow::Result<()> {
        let broker_topic = broker_topic(&self.channel, topic);
        self.client
            .publish(broker_topic.as_str(), QoS::AtLeastOnce, false, payload.to_string().into_bytes())
            .await?;
        info!(topic = %broker_topic, "sim_published");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();

    let client_id = format!("asset-sim-{}", std::process::id());
    let mut mqttoptions = MqttOptions::new(client_id, args.mqtt_host.as_str(), args.mqtt_port);
    mqttoptions.set_keep_alive(Duration::from_secs(30));
    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);

    // Drive the event loop in the background; report the first ConnAck
    let (connected_tx, mut connected_rx) = watch::channel(false);
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("sim_connected");
                    let _ = connected_tx.send(true);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "sim_mqtt_error");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    });

    if tokio::time::timeout(CONNECT_WAIT, connected_rx.wait_for(|c| *c)).await.is_err() {
        warn!(host = %args.mqtt_host, port = %args.mqtt_port, "sim_broker_not_ready, publishing anyway");
    }

    let publisher = Publisher { client, channel: args.channel.clone() };
    let leg = Leg {
        from: args.from,
        to: args.to,
        steps: args.steps.max(1),
        step_interval: Duration::from_millis(args.interval_ms),
    };
    info!(
        from = ?leg.from,
        to = ?leg.to,
        distance_m = %distance_meters(leg.from, leg.to).round(),
        steps = %leg.steps,
        "sim_leg_started"
    );

    let started = Instant::now();
    publisher.publish(EventTopic::LocationUpdate, &location_payload(&leg, 0, &args.label)).await?;
    publisher.publish(EventTopic::RouteUpdate, &route_payload(&leg)).await?;
    publisher.publish(EventTopic::StatusUpdate, &status_payload("en_route")).await?;

    let mut approaching_sent = false;
    for step in 1..=leg.steps {
        tokio::time::sleep(leg.step_interval).await;
        publisher
            .publish(EventTopic::LocationUpdate, &location_payload(&leg, step, &args.label))
            .await?;

        if !approaching_sent && distance_meters(leg.point(step), leg.to) <= APPROACH_RADIUS_M {
            publisher.publish(EventTopic::StatusUpdate, &status_payload("approaching")).await?;
            approaching_sent = true;
        }
    }

    publisher
        .publish(EventTopic::ArrivalNotification, &arrival_payload(&leg, &args.label, started))
        .await?;
    publisher.publish(EventTopic::StatusUpdate, &status_payload("arrived")).await?;

    // Let QoS 1 publishes flush before the process exits
    tokio::time::sleep(Duration::from_millis(500)).await;
    publisher.client.disconnect().await?;
    info!(elapsed_secs = %started.elapsed().as_secs(), "sim_complete");
    Ok(())
}
