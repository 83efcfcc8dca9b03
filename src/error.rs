//! Top-level error type for session setup
//!
//! Each concern keeps its own error enum next to its code; this module
//! aggregates them for callers that start a session end to end.

use crate::config::ConfigError;
use crate::credentials::CredentialError;
use crate::protocol::TopicError;
use crate::transport::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid topic: {0}")]
    Topic(#[from] TopicError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("No async runtime available to drive the session")]
    NoRuntime,
}

impl SessionError {
    /// Misconfiguration that retrying cannot fix
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            SessionError::Topic(_) | SessionError::Credential(_) | SessionError::Config(_)
        )
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_error_converts() {
        let error: SessionError = TopicError::Empty.into();
        assert!(matches!(error, SessionError::Topic(TopicError::Empty)));
        assert!(error.is_configuration_error());
    }

    #[test]
    fn test_credential_error_converts() {
        let error: SessionError = CredentialError::EmptyDeviceId.into();
        assert!(error.is_configuration_error());
        assert_eq!(
            error.to_string(),
            "Credential error: Device identifier is empty"
        );
    }

    #[test]
    fn test_transport_error_is_not_configuration() {
        let error: SessionError = TransportError::NotConnected.into();
        assert!(!error.is_configuration_error());
        assert!(!SessionError::NoRuntime.is_configuration_error());
    }
}
