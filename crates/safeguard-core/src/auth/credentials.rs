//! Durable storage of the credential triple.
//!
//! The triple (`token`, `user_id`, `user_email`) is always written and
//! cleared as a unit. Backends only know about string keys; the layout and
//! the all-or-nothing load rule live here.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub const TOKEN_KEY: &str = "token";
pub const USER_ID_KEY: &str = "user_id";
pub const EMAIL_KEY: &str = "user_email";

/// Keys in the order they are removed. The token goes first so that an
/// interrupted clear never leaves a loadable triple behind.
const ALL_KEYS: [&str; 3] = [TOKEN_KEY, USER_ID_KEY, EMAIL_KEY];

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("Corrupt credential file: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// A platform key/value capability the credential store is written against.
pub trait KeyValueBackend: Send + Sync {
    /// Read a key. A missing key is `Ok(None)`, not an error.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a key. Removing a missing key succeeds.
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Write several keys. Entries are applied in order; backends that can
    /// write them atomically should override this.
    fn set_all(&self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }

    /// Remove several keys, in order.
    fn remove_all(&self, keys: &[&str]) -> Result<(), StoreError> {
        for key in keys {
            self.remove(key)?;
        }
        Ok(())
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredential {
    pub token: String,
    pub user_id: i64,
    pub email: String,
}

impl fmt::Debug for StoredCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredCredential")
            .field("token", &"<redacted>")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .finish()
    }
}

pub struct CredentialStore {
    backend: Box<dyn KeyValueBackend>,
}

impl CredentialStore {
    pub fn new(backend: impl KeyValueBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    /// Load the stored triple. Partial presence reads as absent.
    pub fn load(&self) -> Result<Option<StoredCredential>, StoreError> {
        let token = self.backend.get(TOKEN_KEY)?;
        let user_id = self.backend.get(USER_ID_KEY)?;
        let email = self.backend.get(EMAIL_KEY)?;

        match (token, user_id, email) {
            (Some(token), Some(user_id), Some(email)) if !token.is_empty() => {
                match user_id.trim().parse::<i64>() {
                    Ok(user_id) => Ok(Some(StoredCredential {
                        token,
                        user_id,
                        email,
                    })),
                    Err(_) => {
                        warn!("Stored user id is not numeric, ignoring stored credential");
                        Ok(None)
                    }
                }
            }
            (None, None, None) => Ok(None),
            _ => {
                debug!("Partial credential in storage, treating as absent");
                Ok(None)
            }
        }
    }

    /// Write all three fields. Safe to repeat with the same value.
    pub fn save(&self, credential: &StoredCredential) -> Result<(), StoreError> {
        let user_id = credential.user_id.to_string();
        // Drop the old token first: a write that fails halfway then reads as absent
        // instead of pairing a stale token with new identity fields.
        self.backend.remove(TOKEN_KEY)?;
        self.backend.set_all(&[
            (USER_ID_KEY, &user_id),
            (EMAIL_KEY, &credential.email),
            (TOKEN_KEY, &credential.token),
        ])
    }

    /// Remove all three fields. Succeeds when some or all are already gone.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.backend.remove_all(&ALL_KEYS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryBackend;

    fn credential() -> StoredCredential {
        StoredCredential {
            token: "T1".to_string(),
            user_id: 42,
            email: "demo@safeguard.ai".to_string(),
        }
    }

    #[test]
    fn test_load_empty_store() {
        let store = CredentialStore::new(MemoryBackend::default());
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_save_then_load() {
        let store = CredentialStore::new(MemoryBackend::default());
        store.save(&credential()).unwrap();
        assert_eq!(store.load().unwrap(), Some(credential()));
    }

    #[test]
    fn test_save_is_idempotent() {
        let store = CredentialStore::new(MemoryBackend::default());
        store.save(&credential()).unwrap();
        store.save(&credential()).unwrap();
        assert_eq!(store.load().unwrap(), Some(credential()));
    }

    #[test]
    fn test_partial_presence_reads_as_absent() {
        let backend = MemoryBackend::default();
        backend.set(TOKEN_KEY, "T1").unwrap();
        backend.set(USER_ID_KEY, "42").unwrap();
        let store = CredentialStore::new(backend);

        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_non_numeric_user_id_reads_as_absent() {
        let backend = MemoryBackend::default();
        backend.set(TOKEN_KEY, "T1").unwrap();
        backend.set(USER_ID_KEY, "forty-two").unwrap();
        backend.set(EMAIL_KEY, "demo@safeguard.ai").unwrap();
        let store = CredentialStore::new(backend);

        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_empty_token_reads_as_absent() {
        let backend = MemoryBackend::default();
        backend.set(TOKEN_KEY, "").unwrap();
        backend.set(USER_ID_KEY, "42").unwrap();
        backend.set(EMAIL_KEY, "demo@safeguard.ai").unwrap();
        let store = CredentialStore::new(backend);

        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_clear_removes_everything() {
        let store = CredentialStore::new(MemoryBackend::default());
        store.save(&credential()).unwrap();
        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_clear_when_partially_absent() {
        let backend = MemoryBackend::default();
        backend.set(EMAIL_KEY, "demo@safeguard.ai").unwrap();
        let store = CredentialStore::new(backend);

        store.clear().unwrap();
        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_debug_redacts_token() {
        let rendered = format!("{:?}", credential());
        assert!(!rendered.contains("T1"));
        assert!(rendered.contains("demo@safeguard.ai"));
    }
}
