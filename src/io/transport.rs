//! Transport seam
//!
//! A transport opens a connection to the event source, delivers payloads
//! for each subscribed topic into the session channel, and reports its
//! connection state. Reconnects and retries are the transport's business.

use crate::domain::types::{ConnectionState, EventTopic};
use crate::services::session::SessionSender;
use async_trait::async_trait;

/// Connection or subscription failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Broker refused or the network failed
    ConnectFailed(String),
    /// No acknowledgement within the timeout (ms)
    ConnectTimeout(u64),
    SubscribeFailed { topic: String, reason: String },
    /// Operation needs an open connection
    NotConnected,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::ConnectFailed(reason) => write!(f, "connect failed: {reason}"),
            TransportError::ConnectTimeout(ms) => write!(f, "connect timed out after {ms} ms"),
            TransportError::SubscribeFailed { topic, reason } => {
                write!(f, "subscribe to {topic} failed: {reason}")
            }
            TransportError::NotConnected => write!(f, "not connected"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Source of tracking events
#[async_trait]
pub trait Transport: Send {
    /// Open the connection; resolves once the source has acknowledged it
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Deliver payloads for `topic` into `sink` until disconnect
    async fn subscribe(&mut self, topic: EventTopic, sink: SessionSender)
        -> Result<(), TransportError>;

    fn connection_state(&self) -> ConnectionState;

    /// Drop subscriptions and close; safe to call when not connected
    async fn disconnect(&mut self);
}
