//! Transport layer for the push session
//!
//! This module provides the broker transport abstraction consumed by the
//! session and an MQTT implementation on top of rumqttc.

use bytes::Bytes;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod mqtt;

pub use rumqttc::QoS;

/// Broker transport used by the session
///
/// Every operation completes asynchronously; unsolicited events (connection
/// loss, reconnection, inbound messages) are delivered through the sender
/// installed with [`Transport::set_event_sender`].
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open the connection; resolves once the broker accepted it
    async fn connect(&self, options: &ConnectOptions) -> Result<(), TransportError>;

    /// Subscribe to a fully qualified topic; resolves on broker acknowledgment
    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), TransportError>;

    /// Unsubscribe from a fully qualified topic
    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError>;

    /// Publish a payload to a fully qualified topic (never retained)
    async fn publish(&self, topic: &str, payload: Bytes, qos: QoS) -> Result<(), TransportError>;

    /// Close the connection
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Install the channel unsolicited events are delivered on
    fn set_event_sender(&self, sender: mpsc::Sender<TransportEvent>);
}

/// Events the transport raises on its own execution context
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// An established connection dropped; automatic reconnect is under way
    ConnectionLost(String),
    /// Automatic reconnect succeeded
    ReconnectComplete,
    /// A message arrived on a subscribed topic
    MessageArrived { topic: String, payload: Bytes },
}

/// Options for opening a broker connection
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub broker_uri: String,
    pub client_id: String,
    pub username: String,
    pub password: String,
    pub automatic_reconnect: bool,
    pub clean_session: bool,
    pub keep_alive: Duration,
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("broker_uri", &self.broker_uri)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("automatic_reconnect", &self.automatic_reconnect)
            .field("clean_session", &self.clean_session)
            .field("keep_alive", &self.keep_alive)
            .finish()
    }
}

/// Transport failures, always reported asynchronously through the session sink
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Invalid broker URI: {0}")]
    InvalidBrokerUri(String),
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Connection lost: {0}")]
    ConnectionLost(String),
    #[error("Subscription to {topic} failed: {reason}")]
    SubscriptionFailed { topic: String, reason: String },
    #[error("Unsubscribe from {topic} failed: {reason}")]
    UnsubscribeFailed { topic: String, reason: String },
    #[error("Publish to {topic} failed: {reason}")]
    PublishFailed { topic: String, reason: String },
    #[error("Disconnect failed: {0}")]
    DisconnectFailed(String),
    #[error("Not connected")]
    NotConnected,
    #[error("Disconnected buffer full ({capacity} operations queued)")]
    BufferFull { capacity: usize },
}
