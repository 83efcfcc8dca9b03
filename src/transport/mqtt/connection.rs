//! Pure connection configuration and link tracking for the MQTT transport
//!
//! This module contains pure functions for building rumqttc options from the
//! session's connect options and for deciding when a dropped link counts as
//! lost or recovered.

use crate::transport::{ConnectOptions, TransportError};
use rumqttc::{MqttOptions, Transport as NetworkTransport};
use url::Url;

/// Reconnection pacing between event loop polls after a network error
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Backoff pattern in milliseconds, indexed by consecutive failed attempts
    pub backoff_pattern: Vec<u64>,
    /// Delay to use after pattern is exhausted
    pub sustained_delay: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            backoff_pattern: vec![250, 500, 1000, 2000],
            sustained_delay: 5000,
        }
    }
}

impl ReconnectConfig {
    /// Delay before the given attempt (1-based)
    pub fn calculate_backoff_delay(&self, attempt: u32) -> u64 {
        let index = attempt.saturating_sub(1) as usize;
        self.backoff_pattern
            .get(index)
            .copied()
            .unwrap_or(self.sustained_delay)
    }
}

/// Broker address split into the parts rumqttc needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

/// Parse `scheme://host:port`; `tcp`/`mqtt` are plain, `ssl`/`mqtts` use TLS
pub fn parse_broker_uri(uri: &str) -> Result<BrokerAddress, TransportError> {
    let url = Url::parse(uri).map_err(|_| TransportError::InvalidBrokerUri(uri.to_string()))?;

    let tls = match url.scheme() {
        "tcp" | "mqtt" => false,
        "ssl" | "mqtts" => true,
        _ => return Err(TransportError::InvalidBrokerUri(uri.to_string())),
    };

    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| TransportError::InvalidBrokerUri(uri.to_string()))?;
    let port = url.port().unwrap_or(if tls { 8883 } else { 1883 });

    Ok(BrokerAddress {
        host: host.to_string(),
        port,
        tls,
    })
}

/// Build rumqttc options from session connect options
pub fn configure_mqtt_options(options: &ConnectOptions) -> Result<MqttOptions, TransportError> {
    let address = parse_broker_uri(&options.broker_uri)?;

    let mut mqtt_options = MqttOptions::new(&options.client_id, address.host, address.port);

    if address.tls {
        mqtt_options.set_transport(NetworkTransport::tls_with_default_config());
    }

    mqtt_options.set_credentials(&options.username, &options.password);
    mqtt_options.set_clean_session(options.clean_session);
    mqtt_options.set_keep_alive(options.keep_alive);

    Ok(mqtt_options)
}

/// Link status as observed by the event loop driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Online,
    Offline { failed_attempts: u32 },
}

/// What the driver should do after a network error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkFailure {
    /// True only for the first error after being online
    pub newly_lost: bool,
    /// Delay before polling again
    pub delay_ms: u64,
}

/// Tracks online/offline transitions of an established connection
#[derive(Debug, Clone)]
pub struct LinkTracker {
    state: LinkState,
    reconnect_config: ReconnectConfig,
}

impl LinkTracker {
    /// Tracker for a link that just received its first ConnAck
    pub fn online(reconnect_config: ReconnectConfig) -> Self {
        Self {
            state: LinkState::Online,
            reconnect_config,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Record a ConnAck; returns true when it ends an outage
    pub fn on_connack(&mut self) -> bool {
        let recovered = matches!(self.state, LinkState::Offline { .. });
        self.state = LinkState::Online;
        recovered
    }

    /// Record a network error
    pub fn on_error(&mut self) -> LinkFailure {
        let (newly_lost, attempt) = match self.state {
            LinkState::Online => (true, 1),
            LinkState::Offline { failed_attempts } => (false, failed_attempts + 1),
        };
        self.state = LinkState::Offline {
            failed_attempts: attempt,
        };

        LinkFailure {
            newly_lost,
            delay_ms: self.reconnect_config.calculate_backoff_delay(attempt),
        }
    }
}
