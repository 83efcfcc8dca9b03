//! Password derivation from a device identifier and a locally stored salt
//!
//! The password is never chosen by a human: it is `hex(sha256(device_id + salt))`
//! where the salt is a random value generated on first use and persisted.

use super::device::DeviceId;
use super::store::KeyValueStore;
use super::CredentialError;
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::{debug, info};
use uuid::Uuid;

/// Store key holding the generated salt
pub const SALT_KEY: &str = "push_session_salt";

/// Derived broker credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    device_id: DeviceId,
    salt: String,
    password_hash: String,
}

impl Credential {
    /// Broker username: the device identifier itself
    pub fn username(&self) -> &str {
        self.device_id.as_str()
    }

    pub fn password(&self) -> &str {
        &self.password_hash
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn salt(&self) -> &str {
        &self.salt
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("device_id", &self.device_id)
            .field("password_hash", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// Derive credentials, generating and persisting the salt on first use
pub fn derive_credential(
    device_id: &DeviceId,
    store: &dyn KeyValueStore,
) -> Result<Credential, CredentialError> {
    let salt = load_or_create_salt(store)?;
    let password_hash = hash_password(device_id.as_str(), &salt);

    Ok(Credential {
        device_id: device_id.clone(),
        salt,
        password_hash,
    })
}

/// `hex(sha256(device_id || salt))`
pub fn hash_password(device_id: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(device_id.as_bytes());
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())
}

fn load_or_create_salt(store: &dyn KeyValueStore) -> Result<String, CredentialError> {
    // A stored salt is never replaced, not even an empty one
    match store.get(SALT_KEY)? {
        Some(salt) if salt.is_empty() => return Err(CredentialError::EmptySalt),
        Some(salt) => {
            debug!("Using stored credential salt");
            return Ok(salt);
        }
        None => {}
    }

    let generated = Uuid::new_v4().to_string();
    store.put(SALT_KEY, &generated)?;

    // Only a salt that reads back is reproducible on the next start
    match store.get(SALT_KEY)? {
        Some(stored) if stored == generated => {
            info!("Generated and stored new credential salt");
            Ok(stored)
        }
        _ => Err(CredentialError::SaltNotPersisted),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::store::{MemoryStore, StoreError};
    use proptest::prelude::*;

    struct ReadOnlyStore;

    impl KeyValueStore for ReadOnlyStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Ok(None)
        }

        fn put(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::Poisoned)
        }
    }

    struct ForgetfulStore;

    impl KeyValueStore for ForgetfulStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Ok(None)
        }

        fn put(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Ok(())
        }
    }

    proptest! {
        #[test]
        fn hash_is_deterministic(device in ".{1,40}", salt in ".{0,40}") {
            prop_assert_eq!(hash_password(&device, &salt), hash_password(&device, &salt));
        }

        #[test]
        fn hash_is_fixed_width_hex(device in ".{1,40}", salt in ".{0,40}") {
            let hash = hash_password(&device, &salt);
            prop_assert_eq!(hash.len(), 64);
            prop_assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
    }

    #[test]
    fn test_known_digest() {
        // sha256("abc")
        assert_eq!(
            hash_password("a", "bc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_fresh_store_written_exactly_once() {
        let store = MemoryStore::new();
        let device = DeviceId::new("device-1").unwrap();

        let first = derive_credential(&device, &store).unwrap();
        assert_eq!(store.write_count(), 1);
        assert_eq!(store.get(SALT_KEY).unwrap().as_deref(), Some(first.salt()));

        let second = derive_credential(&device, &store).unwrap();
        assert_eq!(store.write_count(), 1);
        assert_eq!(first, second);
    }

    #[test]
    fn test_existing_salt_is_reused() {
        let store = MemoryStore::new();
        store.put(SALT_KEY, "fixed-salt").unwrap();
        let device = DeviceId::new("device-1").unwrap();

        let credential = derive_credential(&device, &store).unwrap();

        assert_eq!(credential.salt(), "fixed-salt");
        assert_eq!(credential.password(), hash_password("device-1", "fixed-salt"));
        assert_eq!(credential.username(), "device-1");
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn test_empty_stored_salt_is_not_regenerated() {
        let store = MemoryStore::new();
        store.put(SALT_KEY, "").unwrap();
        let device = DeviceId::new("device-1").unwrap();

        let result = derive_credential(&device, &store);

        assert!(matches!(result, Err(CredentialError::EmptySalt)));
        assert_eq!(store.write_count(), 1);
        assert_eq!(store.get(SALT_KEY).unwrap().as_deref(), Some(""));
    }

    #[test]
    fn test_write_failure_is_surfaced() {
        let device = DeviceId::new("device-1").unwrap();
        let result = derive_credential(&device, &ReadOnlyStore);
        assert!(matches!(result, Err(CredentialError::Store(_))));
    }

    #[test]
    fn test_unreadable_write_is_surfaced() {
        let device = DeviceId::new("device-1").unwrap();
        let result = derive_credential(&device, &ForgetfulStore);
        assert!(matches!(result, Err(CredentialError::SaltNotPersisted)));
    }

    #[test]
    fn test_debug_redacts_password() {
        let store = MemoryStore::new();
        let device = DeviceId::new("device-1").unwrap();
        let credential = derive_credential(&device, &store).unwrap();

        let rendered = format!("{credential:?}");
        assert!(!rendered.contains(credential.password()));
        assert!(rendered.contains("redacted"));
    }
}
