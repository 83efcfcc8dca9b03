//! Host-implemented sink for session lifecycle and message events

use crate::transport::TransportError;
use tracing::{info, warn};

/// Callbacks the host application implements
///
/// Called from the runtime's worker tasks, never while the session lock is held.
pub trait NotificationActions: Send + Sync {
    /// A message arrived; `topic` is the short name when inside the namespace
    fn on_message_received(&self, topic: &str, payload: &[u8]);

    /// The session is usable: connected, or the topic set just changed
    fn on_connection_complete(&self);

    /// An established connection dropped; reconnect is automatic
    fn on_connection_lost(&self, cause: &TransportError);

    /// Connecting, subscribing or publishing failed
    fn on_connection_failed(&self, cause: &TransportError);

    /// Disconnecting or unsubscribing failed
    fn on_disconnect_failed(&self, cause: &TransportError);
}

/// Sink that only logs, for headless use
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingActions;

impl NotificationActions for LoggingActions {
    fn on_message_received(&self, topic: &str, payload: &[u8]) {
        info!(
            topic,
            payload = %String::from_utf8_lossy(payload),
            "Push notification received"
        );
    }

    fn on_connection_complete(&self) {
        info!("Push session ready");
    }

    fn on_connection_lost(&self, cause: &TransportError) {
        warn!("Push session connection lost: {}", cause);
    }

    fn on_connection_failed(&self, cause: &TransportError) {
        warn!("Push session operation failed: {}", cause);
    }

    fn on_disconnect_failed(&self, cause: &TransportError) {
        warn!("Push session disconnect failed: {}", cause);
    }
}
