//! Domain models - core tracking types, geo math and the movement trail
//!
//! This module contains the canonical data types used throughout the system:
//! - `types` - Position, Destination, Route, ArrivalStatus, ConnectionState
//! - `payload` - Lenient wire shapes of inbound events
//! - `geo` - Great-circle distance and bearing
//! - `trail` - Bounded movement history with derived statistics

pub mod geo;
pub mod payload;
pub mod trail;
pub mod types;

pub use geo::{bearing_degrees, distance_meters};
pub use trail::{SpeedClass, TrailBuffer, TrailPoint, TrailStats};
pub use types::{
    ArrivalStatus, ConnectionState, ConnectionStatus, Destination, EventTopic, LatLng,
    MovementStatus, Position, Route, TrackingEvent,
};
