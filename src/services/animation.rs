//! Marker animation between reported fixes
//!
//! Two states: idle, or animating one run from a start point toward a target
//! position. Time comes from an injected `Clock` and ticks from an injected
//! `TickScheduler`, so the driver never touches wall-clock time directly and
//! tests can step it deterministically.
//!
//! Each run has a `RunId`. A tick carrying any other id is stale and ignored;
//! that is what keeps a superseded or cancelled run from writing the
//! rendered position after it was abandoned.

use crate::domain::geo::distance_meters;
use crate::domain::types::{epoch_ms, LatLng, Position};
use crate::services::session::{SessionInput, SessionSender};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Shortest animation (ms)
pub const MIN_DURATION_MS: u64 = 500;
/// Longest animation (ms)
pub const MAX_DURATION_MS: u64 = 3000;
/// Longest animation when moving slowly (ms)
pub const SLOW_MAX_DURATION_MS: u64 = 1500;
/// Speed below which the slow cap applies (km/h)
const SLOW_SPEED_KMH: f64 = 5.0;

/// Identifier of one animation run
pub type RunId = u64;

/// Source of "now" in epoch milliseconds
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        epoch_ms()
    }
}

/// Cancels one scheduled tick when invoked
pub struct TickHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl TickHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self { cancel: Some(Box::new(cancel)) }
    }

    /// Handle with nothing to cancel
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for TickHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickHandle").field("pending", &self.cancel.is_some()).finish()
    }
}

/// Delivers animation ticks back to the owner of the driver
pub trait TickScheduler: Send {
    /// Arrange for a tick of `run` to arrive after `delay`
    fn schedule_tick(&mut self, run: RunId, delay: Duration) -> TickHandle;
}

/// Scheduler that posts ticks onto the session input channel
///
/// Each tick is a short-lived task; cancelling aborts the task so a
/// cancelled tick never reaches the channel.
pub struct TokioTickScheduler {
    tx: SessionSender,
}

impl TokioTickScheduler {
    pub fn new(tx: SessionSender) -> Self {
        Self { tx }
    }
}

impl TickScheduler for TokioTickScheduler {
    fn schedule_tick(&mut self, run: RunId, delay: Duration) -> TickHandle {
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(SessionInput::AnimationTick(run)).await;
        });
        let abort = task.abort_handle();
        TickHandle::new(move || abort.abort())
    }
}

/// Why an animation could not start
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnimationFault {
    NonFiniteTarget(LatLng),
    NonFiniteStart(LatLng),
}

impl std::fmt::Display for AnimationFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnimationFault::NonFiniteTarget(p) => write!(f, "non-finite animation target {p}"),
            AnimationFault::NonFiniteStart(p) => write!(f, "non-finite animation start {p}"),
        }
    }
}

impl std::error::Error for AnimationFault {}

/// The in-flight run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationState {
    pub run: RunId,
    pub start_time_ms: u64,
    pub start: LatLng,
    pub target: Position,
    pub duration_ms: u64,
}

impl AnimationState {
    /// Progress in [0, 1] at `now_ms`
    pub fn progress(&self, now_ms: u64) -> f64 {
        if self.duration_ms == 0 {
            return 1.0;
        }
        let elapsed = now_ms.saturating_sub(self.start_time_ms) as f64;
        (elapsed / self.duration_ms as f64).clamp(0.0, 1.0)
    }

    /// Interpolated point at `now_ms`
    pub fn point_at(&self, now_ms: u64) -> LatLng {
        let eased = ease_out_cubic(self.progress(now_ms));
        let target = self.target.coords();
        LatLng::new(
            self.start.lat + (target.lat - self.start.lat) * eased,
            self.start.lng + (target.lng - self.start.lng) * eased,
        )
    }
}

/// Result of starting a run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Begin {
    pub run: RunId,
    pub start: LatLng,
    /// Target of the run this one replaced, if any
    pub superseded: Option<Position>,
}

/// Result of delivering a tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Tick for a run that is no longer active
    Stale,
    /// Intermediate point to render
    Frame(LatLng),
    /// Run finished; the exact target is final
    Completed(Position),
}

struct ActiveRun {
    state: AnimationState,
    pending: Option<TickHandle>,
}

/// `1 - (1 - t)^3`
#[inline]
pub fn ease_out_cubic(t: f64) -> f64 {
    1.0 - (1.0 - t).powi(3)
}

/// Animation length for a move, in milliseconds
///
/// Proportional to distance over speed, bounded to [500, 3000] ms, and
/// capped at 1500 ms below 5 km/h. Speeds under 1 km/h count as 1.
pub fn compute_duration(from: LatLng, to: LatLng, speed_kmh: f64) -> u64 {
    let speed = speed_kmh.max(1.0);
    let raw = distance_meters(from, to) / speed * 100.0;
    let mut duration = if raw.is_finite() {
        raw.clamp(MIN_DURATION_MS as f64, MAX_DURATION_MS as f64)
    } else {
        MAX_DURATION_MS as f64
    };
    if speed < SLOW_SPEED_KMH {
        duration = duration.min(SLOW_MAX_DURATION_MS as f64);
    }
    duration.round() as u64
}

/// Time-driven interpolation state machine
pub struct AnimationDriver {
    clock: Arc<dyn Clock>,
    scheduler: Box<dyn TickScheduler>,
    frame_interval: Duration,
    active: Option<ActiveRun>,
    last_run: RunId,
}

impl AnimationDriver {
    pub fn new(
        clock: Arc<dyn Clock>,
        scheduler: Box<dyn TickScheduler>,
        frame_interval: Duration,
    ) -> Self {
        Self { clock, scheduler, frame_interval, active: None, last_run: 0 }
    }

    pub fn is_animating(&self) -> bool {
        self.active.is_some()
    }

    pub fn state(&self) -> Option<&AnimationState> {
        self.active.as_ref().map(|run| &run.state)
    }

    /// Where the marker is right now, if a run is in flight
    pub fn current_point(&self) -> Option<LatLng> {
        let now = self.clock.now_ms();
        self.active.as_ref().map(|run| run.state.point_at(now))
    }

    /// Start a run toward `to`
    ///
    /// An in-flight run is superseded: its pending tick is cancelled and the
    /// new run starts from the old run's current interpolated point rather
    /// than from `from`.
    pub fn begin(
        &mut self,
        from: LatLng,
        to: Position,
        duration_ms: u64,
    ) -> Result<Begin, AnimationFault> {
        if !to.coords().is_finite() {
            return Err(AnimationFault::NonFiniteTarget(to.coords()));
        }

        let now = self.clock.now_ms();
        let (start, superseded) = match self.active.take() {
            Some(mut previous) => {
                if let Some(pending) = previous.pending.take() {
                    pending.cancel();
                }
                debug!(
                    run = %previous.state.run,
                    abandoned = %previous.state.target.coords(),
                    "animation_superseded"
                );
                (previous.state.point_at(now), Some(previous.state.target))
            }
            None => (from, None),
        };

        if !start.is_finite() {
            return Err(AnimationFault::NonFiniteStart(start));
        }

        self.last_run += 1;
        let run = self.last_run;
        let pending = self.scheduler.schedule_tick(run, self.frame_interval);
        self.active = Some(ActiveRun {
            state: AnimationState { run, start_time_ms: now, start, target: to, duration_ms },
            pending: Some(pending),
        });

        debug!(run = %run, from = %start, to = %to.coords(), duration_ms = %duration_ms, "animation_started");
        Ok(Begin { run, start, superseded })
    }

    /// Advance the run identified by `run`
    pub fn tick(&mut self, run: RunId) -> TickOutcome {
        let now = self.clock.now_ms();
        let Some(active) = self.active.as_mut() else {
            return TickOutcome::Stale;
        };
        if active.state.run != run {
            return TickOutcome::Stale;
        }
        // The tick being delivered is the one that was pending
        active.pending = None;

        if active.state.progress(now) >= 1.0 {
            let target = active.state.target;
            self.active = None;
            debug!(run = %run, "animation_completed");
            return TickOutcome::Completed(target);
        }

        let point = active.state.point_at(now);
        active.pending = Some(self.scheduler.schedule_tick(run, self.frame_interval));
        trace!(run = %run, point = %point, "animation_frame");
        TickOutcome::Frame(point)
    }

    /// Stop without committing anything; returns whether a run was active
    pub fn cancel(&mut self) -> bool {
        match self.active.take() {
            Some(mut run) => {
                if let Some(pending) = run.pending.take() {
                    pending.cancel();
                }
                debug!(run = %run.state.run, "animation_cancelled");
                true
            }
            None => false,
        }
    }
}

impl Drop for AnimationDriver {
    fn drop(&mut self) {
        self.cancel();
    }
}
