//! Configuration for the push session binary
//!
//! Loaded from a TOML file and validated up front so a bad broker URL or
//! initial topic fails before any connection attempt.

use crate::credentials::{CredentialError, DeviceId, JsonFileStore};
use crate::protocol::validate_short_topic;
use crate::session::SessionSettings;
use crate::transport::mqtt::parse_broker_uri;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Top-level configuration file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushConfig {
    pub broker: BrokerSection,
    pub session: SessionSection,
    #[serde(default)]
    pub credentials: CredentialsSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    /// Broker URI: tcp, mqtt, ssl or mqtts scheme with a host
    pub url: String,
    /// Keep-alive interval in seconds (default: 60)
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

fn default_keep_alive_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSection {
    /// Short topic subscribed right after the first connect
    pub initial_topic: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CredentialsSection {
    /// Environment variable holding the device identifier
    pub device_id_env: Option<String>,
    /// Where the generated salt is kept; defaults under the user data dir
    pub salt_file: Option<PathBuf>,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PushConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: PushConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_broker_uri(&self.broker.url)
            .map_err(|e| ConfigError::InvalidConfig(format!("broker.url: {e}")))?;

        if self.broker.keep_alive_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "broker.keep_alive_secs must be greater than zero".to_string(),
            ));
        }

        validate_short_topic(&self.session.initial_topic)
            .map_err(|e| ConfigError::InvalidConfig(format!("session.initial_topic: {e}")))?;

        Ok(())
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            broker_uri: self.broker.url.clone(),
            initial_topic: self.session.initial_topic.clone(),
            keep_alive: Duration::from_secs(self.broker.keep_alive_secs),
        }
    }

    pub fn device_id(&self) -> Result<DeviceId, CredentialError> {
        DeviceId::resolve(self.credentials.device_id_env.as_deref())
    }

    /// Salt store at the configured path, or the per-user default
    pub fn salt_store(&self) -> Result<JsonFileStore, ConfigError> {
        let path = match &self.credentials.salt_file {
            Some(path) => path.clone(),
            None => JsonFileStore::default_path().ok_or_else(|| {
                ConfigError::InvalidConfig(
                    "credentials.salt_file is not set and no user data directory exists"
                        .to_string(),
                )
            })?,
        };
        Ok(JsonFileStore::new(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[broker]
url = "tcp://localhost:1883"

[session]
initial_topic = "alerts"
"#;

    #[test]
    fn test_minimal_config_defaults() {
        let config = PushConfig::from_toml_str(MINIMAL).unwrap();

        assert_eq!(config.broker.url, "tcp://localhost:1883");
        assert_eq!(config.broker.keep_alive_secs, 60);
        assert_eq!(config.session.initial_topic, "alerts");
        assert_eq!(config.credentials, CredentialsSection::default());
    }

    #[test]
    fn test_session_settings_conversion() {
        let config = PushConfig::from_toml_str(MINIMAL).unwrap();
        let settings = config.session_settings();

        assert_eq!(settings.broker_uri, "tcp://localhost:1883");
        assert_eq!(settings.initial_topic, "alerts");
        assert_eq!(settings.keep_alive, Duration::from_secs(60));
    }

    #[test]
    fn test_invalid_broker_scheme() {
        let toml_content = r#"
[broker]
url = "http://localhost:1883"

[session]
initial_topic = "alerts"
"#;
        let result = PushConfig::from_toml_str(toml_content);
        assert!(matches!(result, Err(ConfigError::InvalidConfig(msg)) if msg.contains("broker.url")));
    }

    #[test]
    fn test_invalid_initial_topic() {
        let toml_content = r#"
[broker]
url = "tcp://localhost:1883"

[session]
initial_topic = "a/b"
"#;
        let result = PushConfig::from_toml_str(toml_content);
        assert!(
            matches!(result, Err(ConfigError::InvalidConfig(msg)) if msg.contains("session.initial_topic"))
        );
    }

    #[test]
    fn test_zero_keep_alive_rejected() {
        let toml_content = r#"
[broker]
url = "tcp://localhost:1883"
keep_alive_secs = 0

[session]
initial_topic = "alerts"
"#;
        assert!(matches!(
            PushConfig::from_toml_str(toml_content),
            Err(ConfigError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_configured_salt_file_used() {
        let toml_content = r#"
[broker]
url = "ssl://broker.example.com"

[session]
initial_topic = "alerts"

[credentials]
device_id_env = "PUSH_DEVICE_ID"
salt_file = "/tmp/push-salt.json"
"#;
        let config = PushConfig::from_toml_str(toml_content).unwrap();
        let store = config.salt_store().unwrap();

        assert_eq!(store.path(), Path::new("/tmp/push-salt.json"));
        assert_eq!(
            config.credentials.device_id_env.as_deref(),
            Some("PUSH_DEVICE_ID")
        );
    }

    #[test]
    fn test_missing_section_is_parse_error() {
        let result = PushConfig::from_toml_str("[broker]\nurl = \"tcp://h\"\n");
        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }
}
