//! MQTT transport built on rumqttc
//!
//! This module separates pure functions from I/O operations for better
//! testability:
//!
//! - [`connection`] - Pure option building, broker URI parsing and link tracking
//! - [`message_handler`] - Pure routing of rumqttc events
//! - [`pending`] - Completion bookkeeping for subscribe/unsubscribe requests
//! - [`client`] - Impure I/O operations and event loop driver
//!
//! # Usage
//!
//! ```rust,no_run
//! use push_session::transport::mqtt::MqttTransport;
//! use push_session::transport::{ConnectOptions, Transport};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let transport = MqttTransport::new();
//! transport
//!     .connect(&ConnectOptions {
//!         broker_uri: "tcp://localhost:1883".to_string(),
//!         client_id: "PushSessionClient/0/example".to_string(),
//!         username: "device".to_string(),
//!         password: "derived-hash".to_string(),
//!         automatic_reconnect: true,
//!         clean_session: false,
//!         keep_alive: Duration::from_secs(60),
//!     })
//!     .await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod message_handler;
pub mod pending;

pub use client::MqttTransport;
pub use connection::{
    configure_mqtt_options, parse_broker_uri, BrokerAddress, LinkState, LinkTracker,
    ReconnectConfig,
};
pub use message_handler::{EventRoute, MessageHandler};
pub use pending::{PendingRequests, RequestKind};
