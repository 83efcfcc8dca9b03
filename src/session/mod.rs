//! Push notification session
//!
//! [`Session`] owns the broker connection for its lifetime: it connects with a
//! derived credential, subscribes to the initial topic, keeps the subscription
//! registry, buffers operations while the link is down and restores
//! everything after an automatic reconnect.

pub mod actions;
pub mod buffer;
pub mod manager;
pub mod registry;
pub mod state;

pub use actions::{LoggingActions, NotificationActions};
pub use buffer::{
    BufferOptions, BufferOutcome, DisconnectedBuffer, OutboundOperation, DEFAULT_BUFFER_CAPACITY,
};
pub use manager::{
    generate_client_id, Session, SessionSettings, CLIENT_NAME, DEFAULT_KEEP_ALIVE, DELIVERY_QOS,
};
pub use registry::SubscriptionRegistry;
pub use state::{Dispatch, SessionState};
