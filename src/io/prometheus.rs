//! Prometheus metrics HTTP endpoint
//!
//! Exposes tracker counters in Prometheus text format at /metrics and a
//! liveness probe at /health. Uses hyper for the HTTP server.

use crate::infra::metrics::{Metrics, MetricsSummary};
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with asset label
fn write_metric(output: &mut String, name: &str, help: &str, typ: MetricType, asset: &str, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{asset=\"{asset}\"}} {val}");
}

/// Write a counter split by one extra label
fn write_labeled_counter(
    output: &mut String,
    name: &str,
    help: &str,
    asset: &str,
    label: &str,
    values: &[(&str, u64)],
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} counter");
    for (value, count) in values {
        let _ = writeln!(output, "{name}{{asset=\"{asset}\",{label}=\"{value}\"}} {count}");
    }
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(summary: &MetricsSummary, asset: &str) -> String {
    let mut output = String::with_capacity(4096);

    write_labeled_counter(
        &mut output,
        "tracker_events_total",
        "Inbound events by topic",
        asset,
        "topic",
        &[
            ("location-update", summary.location_events),
            ("route-update", summary.route_events),
            ("arrival-notification", summary.arrival_events),
            ("status-update", summary.status_events),
        ],
    );
    write_labeled_counter(
        &mut output,
        "tracker_locations_total",
        "Location updates by outcome",
        asset,
        "outcome",
        &[("accepted", summary.locations_accepted), ("rejected", summary.locations_rejected)],
    );
    write_labeled_counter(
        &mut output,
        "tracker_trail_points_total",
        "Trail appends by outcome",
        asset,
        "outcome",
        &[("appended", summary.trail_appended), ("skipped", summary.trail_skipped)],
    );
    write_labeled_counter(
        &mut output,
        "tracker_animations_total",
        "Animation runs by outcome",
        asset,
        "outcome",
        &[
            ("started", summary.animations_started),
            ("superseded", summary.animations_superseded),
            ("completed", summary.animations_completed),
            ("fault", summary.animation_faults),
        ],
    );
    write_metric(
        &mut output,
        "tracker_immediate_commits_total",
        "Positions committed without animation",
        MetricType::Counter,
        asset,
        summary.immediate_commits,
    );
    write_metric(
        &mut output,
        "tracker_events_dropped_total",
        "Inbound events dropped on a full session channel",
        MetricType::Counter,
        asset,
        summary.events_dropped,
    );
    write_metric(
        &mut output,
        "tracker_connection_updates_dropped_total",
        "Connection changes dropped on a full session channel",
        MetricType::Counter,
        asset,
        summary.connection_updates_dropped,
    );
    write_metric(
        &mut output,
        "tracker_event_latency_max_us",
        "Max handler latency since last periodic report",
        MetricType::Gauge,
        asset,
        summary.max_process_latency_us,
    );

    output
}

fn respond(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    asset: Arc<String>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    Ok(match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let body = format_prometheus_metrics(&metrics.snapshot(), &asset);
            respond(StatusCode::OK, "text/plain; version=0.0.4; charset=utf-8", body)
        }
        (&Method::GET, "/health") => respond(StatusCode::OK, "text/plain", "ok"),
        _ => respond(StatusCode::NOT_FOUND, "text/plain", "Not Found"),
    })
}

/// Start the Prometheus metrics HTTP server
pub async fn start_metrics_server(
    port: u16,
    metrics: Arc<Metrics>,
    asset: String,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let asset = Arc::new(asset);

    info!(port = %port, asset = %asset, "prometheus_metrics_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();
                        let asset = asset.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                handle_request(req, metrics.clone(), asset.clone())
                            });

                            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                                error!(error = %e, "prometheus_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "prometheus_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("prometheus_metrics_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}
