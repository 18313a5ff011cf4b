//! Services - tracking logic and state management
//!
//! This module contains the core tracking services:
//! - `reconciler` - Validates location payloads into positions
//! - `animation` - Marker animation driver with injectable clock and ticks
//! - `session` - Per-asset orchestrator owning all tracking state

pub mod animation;
pub mod reconciler;
pub mod session;

// Re-export commonly used types
pub use animation::{AnimationDriver, Clock, SystemClock, TickScheduler, TokioTickScheduler};
pub use reconciler::InvalidPositionData;
pub use session::{create_session_channel, Lifecycle, SessionInput, SessionSender, TrackingSession};
