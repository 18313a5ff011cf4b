//! Asset tracker - real-time tracking of a single moving asset
//!
//! Subscribes to the location channel over MQTT, keeps the asset's position,
//! trail, route and arrival state, and publishes render updates.
//!
//! Module structure:
//! - `domain/` - Core tracking types, geo math, trail
//! - `io/` - External interfaces (MQTT transport, render publisher, Prometheus)
//! - `services/` - Tracking logic (Reconciler, Animation, Session)
//! - `infra/` - Infrastructure (Config, Metrics)

use asset_tracker::infra::{Config, Metrics};
use asset_tracker::io::{create_render_channel, MqttRenderPublisher, MqttTransport};
use asset_tracker::services::{create_session_channel, TrackingSession};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Session input channel capacity
const SESSION_BUFFER: usize = 1024;
/// Render channel capacity
const RENDER_BUFFER: usize = 256;

/// Asset tracker - follows one asset on the location channel
#[derive(Parser, Debug)]
#[command(name = "asset-tracker", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("asset-tracker starting");

    let args = Args::parse();
    let config = match args.config {
        Some(path) => Config::load_from_path(&path),
        None => Config::load(&[]),
    };

    info!(
        config_file = %config.config_file(),
        asset = %config.site_id(),
        host = %config.transport_host(),
        port = %config.transport_port(),
        channel = %config.transport_channel(),
        animation_enabled = %config.animation_enabled(),
        max_trail_length = %config.max_trail_length(),
        arrival_threshold_m = %config.arrival_threshold_m(),
        render_enabled = %config.render_enabled(),
        prometheus_port = %config.prometheus_port(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    // Start Prometheus metrics HTTP server (if port > 0)
    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let prom_metrics = metrics.clone();
        let prom_shutdown = shutdown_rx.clone();
        let asset = config.site_id().to_string();
        tokio::spawn(async move {
            if let Err(e) = asset_tracker::io::prometheus::start_metrics_server(
                prometheus_port,
                prom_metrics,
                asset,
                prom_shutdown,
            )
            .await
            {
                tracing::error!(error = %e, "Prometheus metrics server error");
            }
        });
    }

    // Periodic metrics summary
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    let (inbound, inbound_rx) = create_session_channel(SESSION_BUFFER);
    let transport = MqttTransport::new(&config, metrics.clone());
    let mut session =
        TrackingSession::new(config.clone(), metrics, Box::new(transport), inbound);

    if config.render_enabled() {
        let (render_sender, render_rx) =
            create_render_channel(RENDER_BUFFER, config.site_id().to_string());
        let publisher = MqttRenderPublisher::new(&config, render_rx);
        let publisher_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            publisher.run(publisher_shutdown).await;
        });
        session = session.with_renderer(Box::new(render_sender));
    }

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    session.start().await;
    session.run(inbound_rx, shutdown_rx).await;

    info!("asset-tracker shutdown complete");
    Ok(())
}
