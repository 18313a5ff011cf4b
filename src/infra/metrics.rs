//! Lock-free metrics collection and periodic reporting
//!
//! Counters are plain atomics so the session loop never waits on a lock
//! while the reporter or the Prometheus endpoint reads them.
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only; never use them for coordination or logic decisions.

use crate::domain::types::EventTopic;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Lock-free metrics collector
pub struct Metrics {
    /// Total inbound events (monotonic)
    events_total: AtomicU64,
    /// Inbound events per topic (monotonic), indexed like `EventTopic::ALL`
    events_by_topic: [AtomicU64; 4],
    /// Events since last report (reset on report)
    events_since_report: AtomicU64,
    /// Sum of handler latencies in microseconds (reset on report)
    latency_sum_us: AtomicU64,
    /// Max handler latency in microseconds (reset on report)
    latency_max_us: AtomicU64,
    locations_accepted: AtomicU64,
    locations_rejected: AtomicU64,
    trail_appended: AtomicU64,
    trail_skipped: AtomicU64,
    animations_started: AtomicU64,
    animations_superseded: AtomicU64,
    animations_completed: AtomicU64,
    animation_faults: AtomicU64,
    immediate_commits: AtomicU64,
    /// Inbound events dropped because the session channel was full
    events_dropped: AtomicU64,
    /// Connection changes that could not be queued for the session
    connection_updates_dropped: AtomicU64,
    last_report: Mutex<Instant>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn topic_index(topic: EventTopic) -> usize {
    match topic {
        EventTopic::LocationUpdate => 0,
        EventTopic::RouteUpdate => 1,
        EventTopic::ArrivalNotification => 2,
        EventTopic::StatusUpdate => 3,
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            events_total: AtomicU64::new(0),
            events_by_topic: Default::default(),
            events_since_report: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            locations_accepted: AtomicU64::new(0),
            locations_rejected: AtomicU64::new(0),
            trail_appended: AtomicU64::new(0),
            trail_skipped: AtomicU64::new(0),
            animations_started: AtomicU64::new(0),
            animations_superseded: AtomicU64::new(0),
            animations_completed: AtomicU64::new(0),
            animation_faults: AtomicU64::new(0),
            immediate_commits: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            connection_updates_dropped: AtomicU64::new(0),
            last_report: Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_event_received(&self, topic: EventTopic) {
        self.events_total.fetch_add(1, Ordering::Relaxed);
        self.events_since_report.fetch_add(1, Ordering::Relaxed);
        self.events_by_topic[topic_index(topic)].fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event_processed(&self, latency_us: u64) {
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        update_atomic_max(&self.latency_max_us, latency_us);
    }

    #[inline]
    pub fn record_location_accepted(&self) {
        self.locations_accepted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_location_rejected(&self) {
        self.locations_rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_trail_append(&self, inserted: bool) {
        if inserted {
            self.trail_appended.fetch_add(1, Ordering::Relaxed);
        } else {
            self.trail_skipped.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_animation_started(&self, superseded: bool) {
        self.animations_started.fetch_add(1, Ordering::Relaxed);
        if superseded {
            self.animations_superseded.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_animation_completed(&self) {
        self.animations_completed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_animation_fault(&self) {
        self.animation_faults.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_immediate_commit(&self) {
        self.immediate_commits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_connection_update_dropped(&self) {
        self.connection_updates_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn events_for(&self, topic: EventTopic) -> u64 {
        self.events_by_topic[topic_index(topic)].load(Ordering::Relaxed)
    }

    /// Snapshot counters; per-interval values are reset
    pub fn report(&self) -> MetricsSummary {
        let mut last_report = self.last_report.lock();
        let elapsed = last_report.elapsed().as_secs_f64();
        *last_report = Instant::now();
        drop(last_report);

        let events_interval = self.events_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let latency_max = self.latency_max_us.swap(0, Ordering::Relaxed);

        MetricsSummary {
            events_per_sec: if elapsed > 0.0 { events_interval as f64 / elapsed } else { 0.0 },
            avg_process_latency_us: if events_interval > 0 { latency_sum / events_interval } else { 0 },
            max_process_latency_us: latency_max,
            ..self.totals()
        }
    }

    /// Read counters without resetting anything
    ///
    /// Interval values are read as-is; the rate is left at zero.
    pub fn snapshot(&self) -> MetricsSummary {
        let events_interval = self.events_since_report.load(Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.load(Ordering::Relaxed);
        MetricsSummary {
            avg_process_latency_us: if events_interval > 0 { latency_sum / events_interval } else { 0 },
            max_process_latency_us: self.latency_max_us.load(Ordering::Relaxed),
            ..self.totals()
        }
    }

    /// Monotonic counters only
    fn totals(&self) -> MetricsSummary {
        MetricsSummary {
            events_total: self.events_total.load(Ordering::Relaxed),
            location_events: self.events_for(EventTopic::LocationUpdate),
            route_events: self.events_for(EventTopic::RouteUpdate),
            arrival_events: self.events_for(EventTopic::ArrivalNotification),
            status_events: self.events_for(EventTopic::StatusUpdate),
            locations_accepted: self.locations_accepted.load(Ordering::Relaxed),
            locations_rejected: self.locations_rejected.load(Ordering::Relaxed),
            trail_appended: self.trail_appended.load(Ordering::Relaxed),
            trail_skipped: self.trail_skipped.load(Ordering::Relaxed),
            animations_started: self.animations_started.load(Ordering::Relaxed),
            animations_superseded: self.animations_superseded.load(Ordering::Relaxed),
            animations_completed: self.animations_completed.load(Ordering::Relaxed),
            animation_faults: self.animation_faults.load(Ordering::Relaxed),
            immediate_commits: self.immediate_commits.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            connection_updates_dropped: self.connection_updates_dropped.load(Ordering::Relaxed),
            ..MetricsSummary::default()
        }
    }
}

/// Point-in-time view of the counters
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub events_total: u64,
    pub events_per_sec: f64,
    pub avg_process_latency_us: u64,
    pub max_process_latency_us: u64,
    pub location_events: u64,
    pub route_events: u64,
    pub arrival_events: u64,
    pub status_events: u64,
    pub locations_accepted: u64,
    pub locations_rejected: u64,
    pub trail_appended: u64,
    pub trail_skipped: u64,
    pub animations_started: u64,
    pub animations_superseded: u64,
    pub animations_completed: u64,
    pub animation_faults: u64,
    pub immediate_commits: u64,
    pub events_dropped: u64,
    pub connection_updates_dropped: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            events_total = %self.events_total,
            events_per_sec = %format!("{:.1}", self.events_per_sec),
            avg_latency_us = %self.avg_process_latency_us,
            max_latency_us = %self.max_process_latency_us,
            accepted = %self.locations_accepted,
            rejected = %self.locations_rejected,
            trail_appended = %self.trail_appended,
            trail_skipped = %self.trail_skipped,
            animations = %self.animations_started,
            superseded = %self.animations_superseded,
            completed = %self.animations_completed,
            faults = %self.animation_faults,
            dropped = %self.events_dropped,
            connection_dropped = %self.connection_updates_dropped,
            "metrics"
        );
    }
}
