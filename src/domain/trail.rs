//! Bounded movement history
//!
//! Points are kept in insertion order. A point closer than the minimum
//! spacing to the last retained point is dropped rather than appended, and
//! the oldest point is evicted once the buffer exceeds its capacity.

use crate::domain::geo::distance_meters;
use crate::domain::types::{LatLng, Position};
use serde::Serialize;
use std::collections::VecDeque;

/// Default number of retained points
pub const DEFAULT_MAX_TRAIL_LENGTH: usize = 50;

/// Minimum distance between consecutive retained points (meters)
pub const MIN_TRAIL_SPACING_M: f64 = 5.0;

/// Average speed above which the trail is classified fast (km/h)
const FAST_SPEED_KMH: f64 = 30.0;
/// Average speed above which the trail is classified medium (km/h)
const MEDIUM_SPEED_KMH: f64 = 10.0;

/// A retained trail point
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrailPoint {
    pub lat: f64,
    pub lng: f64,
    pub timestamp_ms: u64,
    pub speed_kmh: f64,
    pub heading_deg: f64,
}

impl TrailPoint {
    #[inline]
    pub fn coords(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

impl From<&Position> for TrailPoint {
    fn from(position: &Position) -> Self {
        Self {
            lat: position.lat,
            lng: position.lng,
            timestamp_ms: position.timestamp_ms,
            speed_kmh: position.speed_kmh,
            heading_deg: position.heading_deg,
        }
    }
}

/// Aggregate statistics over the retained points
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrailStats {
    /// Sum of consecutive distances, km, 2 decimals
    pub total_distance_km: f64,
    /// km/h, 1 decimal
    pub average_speed_kmh: f64,
    /// km/h, 1 decimal
    pub max_speed_kmh: f64,
    pub point_count: usize,
}

/// Speed classification used to style the trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedClass {
    Fast,
    Medium,
    Slow,
}

impl SpeedClass {
    pub fn from_average_speed(average_kmh: f64) -> Self {
        if average_kmh > FAST_SPEED_KMH {
            SpeedClass::Fast
        } else if average_kmh > MEDIUM_SPEED_KMH {
            SpeedClass::Medium
        } else {
            SpeedClass::Slow
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SpeedClass::Fast => "fast",
            SpeedClass::Medium => "medium",
            SpeedClass::Slow => "slow",
        }
    }
}

/// Round to a fixed number of decimals
#[inline]
pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Capacity-bounded, spacing-filtered trail of recent positions
#[derive(Debug, Clone)]
pub struct TrailBuffer {
    points: VecDeque<TrailPoint>,
    capacity: usize,
    min_spacing_m: f64,
}

impl Default for TrailBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TRAIL_LENGTH)
    }
}

impl TrailBuffer {
    pub fn new(capacity: usize) -> Self {
        Self::with_min_spacing(capacity, MIN_TRAIL_SPACING_M)
    }

    pub fn with_min_spacing(capacity: usize, min_spacing_m: f64) -> Self {
        Self {
            points: VecDeque::with_capacity(capacity.min(1024) + 1),
            capacity,
            min_spacing_m,
        }
    }

    /// Append a point unless it is too close to the last retained one
    ///
    /// Returns whether the point was inserted.
    pub fn append(&mut self, point: TrailPoint) -> bool {
        if self.capacity == 0 {
            return false;
        }
        if let Some(last) = self.points.back() {
            if distance_meters(last.coords(), point.coords()) < self.min_spacing_m {
                return false;
            }
        }

        self.points.push_back(point);
        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
        true
    }

    /// Remove every point
    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last(&self) -> Option<&TrailPoint> {
        self.points.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrailPoint> {
        self.points.iter()
    }

    /// Coordinates only, oldest first
    pub fn path(&self) -> Vec<LatLng> {
        self.points.iter().map(TrailPoint::coords).collect()
    }

    /// Unrounded mean speed, `None` when empty
    pub fn average_speed_kmh(&self) -> Option<f64> {
        if self.points.is_empty() {
            return None;
        }
        let sum: f64 = self.points.iter().map(|p| p.speed_kmh).sum();
        Some(sum / self.points.len() as f64)
    }

    /// Statistics, `None` with fewer than two points
    pub fn stats(&self) -> Option<TrailStats> {
        if self.points.len() < 2 {
            return None;
        }

        let total_m: f64 = self
            .points
            .iter()
            .zip(self.points.iter().skip(1))
            .map(|(a, b)| distance_meters(a.coords(), b.coords()))
            .sum();
        let average = self.average_speed_kmh().unwrap_or(0.0);
        let max = self.points.iter().map(|p| p.speed_kmh).fold(0.0, f64::max);

        Some(TrailStats {
            total_distance_km: round_to(total_m / 1000.0, 2),
            average_speed_kmh: round_to(average, 1),
            max_speed_kmh: round_to(max, 1),
            point_count: self.points.len(),
        })
    }

    /// Speed classification for styling; an empty trail is slow
    pub fn style_hint(&self) -> SpeedClass {
        SpeedClass::from_average_speed(self.average_speed_kmh().unwrap_or(0.0))
    }
}
