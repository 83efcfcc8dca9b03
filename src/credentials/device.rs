//! Stable per-installation device identifiers

use super::CredentialError;
use std::fmt;
use std::path::Path;

const MACHINE_ID_PATHS: [&str; 2] = ["/etc/machine-id", "/var/lib/dbus/machine-id"];

/// Identifier that is unique per installation, not tied to hardware, and
/// recoverable without persisting it ourselves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Result<Self, CredentialError> {
        let id = id.into().trim().to_string();
        if id.is_empty() {
            return Err(CredentialError::EmptyDeviceId);
        }
        Ok(Self(id))
    }

    /// Read the identifier from an environment variable
    pub fn from_env(var_name: &str) -> Result<Self, CredentialError> {
        let value = std::env::var(var_name)
            .map_err(|_| CredentialError::DeviceIdUnavailable(format!("{var_name} is not set")))?;
        Self::new(value)
    }

    /// Read the OS installation identifier
    pub fn from_machine_id() -> Result<Self, CredentialError> {
        MACHINE_ID_PATHS
            .iter()
            .find_map(|path| Self::from_file(Path::new(path)).ok())
            .ok_or_else(|| {
                CredentialError::DeviceIdUnavailable("no machine-id file found".to_string())
            })
    }

    pub fn from_file(path: &Path) -> Result<Self, CredentialError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CredentialError::DeviceIdUnavailable(format!("{}: {e}", path.display()))
        })?;
        Self::new(content)
    }

    /// Environment variable first when configured, machine-id otherwise
    pub fn resolve(env_var: Option<&str>) -> Result<Self, CredentialError> {
        match env_var {
            Some(name) => Self::from_env(name).or_else(|_| Self::from_machine_id()),
            None => Self::from_machine_id(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
