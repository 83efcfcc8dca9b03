//! Device credential derivation
//!
//! - [`device`] - where the stable device identifier comes from
//! - [`store`] - persistent key-value storage for the generated salt
//! - [`deriver`] - salt lifecycle and password hashing

pub mod deriver;
pub mod device;
pub mod store;

pub use deriver::{derive_credential, hash_password, Credential, SALT_KEY};
pub use device::DeviceId;
pub use store::{JsonFileStore, KeyValueStore, MemoryStore, StoreError};

use thiserror::Error;

/// Credential derivation failures; all of them are fatal for a session
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Device identifier is empty")]
    EmptyDeviceId,
    #[error("Device identifier unavailable: {0}")]
    DeviceIdUnavailable(String),
    #[error("Salt store error: {0}")]
    Store(#[from] StoreError),
    #[error("Generated salt could not be read back from the store")]
    SaltNotPersisted,
    #[error("Stored salt is empty")]
    EmptySalt,
}
