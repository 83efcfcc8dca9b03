//! Push Session - durable MQTT push notification sessions
//!
//! A client-side session layer that connects a device to a broker with
//! credentials derived from a stable device identifier, namespaces every topic
//! under a fixed base, and keeps subscriptions alive across network loss.
//!
//! # Overview
//!
//! - [`credentials`] - device identifier, persisted salt and password hash
//! - [`protocol`] - topic namespacing
//! - [`session`] - connection manager, subscription registry, disconnected buffer
//! - [`transport`] - the broker seam and its rumqttc implementation
//!
//! # Quick Start
//!
//! ```rust
//! use push_session::credentials::{derive_credential, DeviceId, MemoryStore};
//! use push_session::protocol::full_topic_name;
//!
//! let store = MemoryStore::new();
//! let device = DeviceId::new("device-1234").unwrap();
//! let credential = derive_credential(&device, &store).unwrap();
//!
//! assert_eq!(credential.username(), "device-1234");
//! assert_eq!(credential.password().len(), 64);
//! assert_eq!(full_topic_name("alerts").unwrap(), "push/notification/alerts");
//! ```

pub mod config;
pub mod credentials;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod session;
pub mod testing;
pub mod transport;

pub use config::{ConfigError, PushConfig};
pub use credentials::{derive_credential, Credential, CredentialError, DeviceId};
pub use error::{SessionError, SessionResult};
pub use protocol::{full_topic_name, TopicError, TopicName};
pub use session::{Dispatch, NotificationActions, Session, SessionSettings, SessionState};
pub use transport::{Transport, TransportError, TransportEvent};
