//! Session lifecycle states and operation outcomes

use std::fmt;

/// Connection state, mutated only by the session's connection manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Disconnecting,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Reconnecting => "reconnecting",
            SessionState::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}

/// What happened to an operation at the moment it was submitted
///
/// The network outcome arrives later through the notification sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Handed to the transport
    Issued,
    /// Held in the disconnected buffer until the link returns
    Buffered,
    /// Disconnected buffer full; failure also reported to the sink
    Rejected,
    /// The first connection has not completed yet; nothing was sent
    NotReady,
    /// The session was disconnected; failure also reported to the sink
    Closed,
}

impl Dispatch {
    /// Issued now or queued for replay
    pub fn is_accepted(self) -> bool {
        matches!(self, Dispatch::Issued | Dispatch::Buffered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_acceptance() {
        assert!(Dispatch::Issued.is_accepted());
        assert!(Dispatch::Buffered.is_accepted());
        assert!(!Dispatch::Rejected.is_accepted());
        assert!(!Dispatch::NotReady.is_accepted());
        assert!(!Dispatch::Closed.is_accepted());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::Reconnecting.to_string(), "reconnecting");
    }
}
