//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! Every section and field is optional; anything left out keeps its default.
//! Transport credentials can also come from `TRACKER_MQTT_USERNAME` /
//! `TRACKER_MQTT_PASSWORD`, which win over the file.

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Asset identifier used in logs and render payloads
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: "asset".to_string() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Default duration for explicit animations (ms)
    pub animation_speed_ms: u64,
    /// Maximum number of trail points
    pub max_trail_length: usize,
    /// Arrival threshold (meters)
    pub arrival_threshold_m: f64,
    /// Radius within which the asset counts as approaching (meters)
    pub approach_radius_m: f64,
    /// Minimum spacing between trail points (meters)
    pub min_trail_spacing_m: f64,
    /// Jump distance that triggers a renderer recenter (meters)
    pub recenter_distance_m: f64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            animation_speed_ms: 1000,
            max_trail_length: 50,
            arrival_threshold_m: 50.0,
            approach_radius_m: 100.0,
            min_trail_spacing_m: 5.0,
            recenter_distance_m: 1000.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    pub enabled: bool,
    /// Tick cadence while an animation runs (ms)
    pub frame_interval_ms: u64,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self { enabled: true, frame_interval_ms: 16 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub host: String,
    pub port: u16,
    pub client_id: Option<String>,
    /// Logical channel name; `:` maps to `/` in broker topics
    pub channel: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub connect_timeout_ms: u64,
    pub keep_alive_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: None,
            channel: "asset-tracking:locations".to_string(),
            username: None,
            password: None,
            connect_timeout_ms: 10_000,
            keep_alive_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Publish render updates to MQTT
    pub enabled: bool,
    pub topic_prefix: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self { enabled: true, topic_prefix: "asset-tracking/render".to_string() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub interval_secs: u64,
    /// Prometheus metrics HTTP port (0 to disable)
    pub prometheus_port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: 10, prometheus_port: 0 }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TomlConfig {
    pub site: SiteConfig,
    pub tracking: TrackingConfig,
    pub animation: AnimationConfig,
    pub transport: TransportConfig,
    pub render: RenderConfig,
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    animation_speed_ms: u64,
    max_trail_length: usize,
    arrival_threshold_m: f64,
    approach_radius_m: f64,
    min_trail_spacing_m: f64,
    recenter_distance_m: f64,
    animation_enabled: bool,
    frame_interval_ms: u64,
    transport_host: String,
    transport_port: u16,
    transport_client_id: Option<String>,
    transport_channel: String,
    transport_username: Option<String>,
    transport_password: Option<String>,
    connect_timeout_ms: u64,
    keep_alive_secs: u64,
    render_enabled: bool,
    render_topic_prefix: String,
    metrics_interval_secs: u64,
    prometheus_port: u16,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        let TomlConfig { site, tracking, animation, transport, render, metrics } = toml_config;
        Self {
            site_id: site.id,
            animation_speed_ms: tracking.animation_speed_ms,
            max_trail_length: tracking.max_trail_length,
            arrival_threshold_m: tracking.arrival_threshold_m,
            approach_radius_m: tracking.approach_radius_m,
            min_trail_spacing_m: tracking.min_trail_spacing_m,
            recenter_distance_m: tracking.recenter_distance_m,
            animation_enabled: animation.enabled,
            // A zero cadence would spin the scheduler
            frame_interval_ms: animation.frame_interval_ms.max(1),
            transport_host: transport.host,
            transport_port: transport.port,
            transport_client_id: transport.client_id,
            transport_channel: transport.channel,
            transport_username: transport.username,
            transport_password: transport.password,
            connect_timeout_ms: transport.connect_timeout_ms,
            keep_alive_secs: transport.keep_alive_secs,
            render_enabled: render.enabled,
            render_topic_prefix: render.topic_prefix,
            metrics_interval_secs: metrics.interval_secs.max(1),
            prometheus_port: metrics.prometheus_port,
            config_file,
        }
    }

    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load configuration from a path, falling back to defaults
    pub fn load_from_path(path: &str) -> Self {
        let config = match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        };
        config.with_env_credentials()
    }

    /// Load configuration - resolves the path from args/env, then as `load_from_path`
    pub fn load(args: &[String]) -> Self {
        Self::load_from_path(&Self::resolve_config_path(args))
    }

    fn with_env_credentials(mut self) -> Self {
        if let Ok(username) = env::var("TRACKER_MQTT_USERNAME") {
            self.transport_username = Some(username);
        }
        if let Ok(password) = env::var("TRACKER_MQTT_PASSWORD") {
            self.transport_password = Some(password);
        }
        self
    }

    /// Broker topic for one event name on the configured channel
    pub fn event_topic(&self, event_name: &str) -> String {
        format!("{}/{}", self.transport_channel.replace(':', "/"), event_name)
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn animation_speed_ms(&self) -> u64 {
        self.animation_speed_ms
    }

    pub fn max_trail_length(&self) -> usize {
        self.max_trail_length
    }

    pub fn arrival_threshold_m(&self) -> f64 {
        self.arrival_threshold_m
    }

    pub fn approach_radius_m(&self) -> f64 {
        self.approach_radius_m
    }

    pub fn min_trail_spacing_m(&self) -> f64 {
        self.min_trail_spacing_m
    }

    pub fn recenter_distance_m(&self) -> f64 {
        self.recenter_distance_m
    }

    pub fn animation_enabled(&self) -> bool {
        self.animation_enabled
    }

    pub fn frame_interval_ms(&self) -> u64 {
        self.frame_interval_ms
    }

    pub fn transport_host(&self) -> &str {
        &self.transport_host
    }

    pub fn transport_port(&self) -> u16 {
        self.transport_port
    }

    pub fn transport_client_id(&self) -> Option<&str> {
        self.transport_client_id.as_deref()
    }

    pub fn transport_channel(&self) -> &str {
        &self.transport_channel
    }

    pub fn transport_username(&self) -> Option<&str> {
        self.transport_username.as_deref()
    }

    pub fn transport_password(&self) -> Option<&str> {
        self.transport_password.as_deref()
    }

    pub fn connect_timeout_ms(&self) -> u64 {
        self.connect_timeout_ms
    }

    pub fn keep_alive_secs(&self) -> u64 {
        self.keep_alive_secs
    }

    pub fn render_enabled(&self) -> bool {
        self.render_enabled
    }

    pub fn render_topic_prefix(&self) -> &str {
        &self.render_topic_prefix
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn prometheus_port(&self) -> u16 {
        self.prometheus_port
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method to override the trail capacity
    pub fn with_max_trail_length(mut self, max: usize) -> Self {
        self.max_trail_length = max;
        self
    }

    /// Builder method to override the arrival threshold
    pub fn with_arrival_threshold_m(mut self, meters: f64) -> Self {
        self.arrival_threshold_m = meters;
        self
    }

    /// Builder method to enable or disable animation
    pub fn with_animation_enabled(mut self, enabled: bool) -> Self {
        self.animation_enabled = enabled;
        self
    }

    /// Builder method to override the explicit-animation default duration
    pub fn with_animation_speed_ms(mut self, ms: u64) -> Self {
        self.animation_speed_ms = ms;
        self
    }

    /// Builder method to point the transport at another broker
    pub fn with_transport_endpoint(mut self, host: impl Into<String>, port: u16) -> Self {
        self.transport_host = host.into();
        self.transport_port = port;
        self
    }
}
