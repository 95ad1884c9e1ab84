//! Authentication module for managing the user session and its credentials.
//!
//! This module provides:
//! - `CredentialStore`: durable storage of the `{token, user_id, email}` triple
//!   over a pluggable key/value backend (file, OS keychain, memory)
//! - `Session` / `SessionState`: the authoritative in-memory session
//! - `SessionManager`: the login / refresh / logout state machine, including
//!   single-flight coordination of concurrent refreshes

pub mod backends;
pub mod credentials;
pub mod error;
pub mod manager;
pub mod session;

pub use backends::{FileBackend, KeyringBackend, MemoryBackend};
pub use credentials::{CredentialStore, KeyValueBackend, StoreError, StoredCredential};
pub use error::{AuthError, RefreshError};
pub use manager::SessionManager;
pub use session::{Session, SessionSnapshot, SessionState, SessionUpdate};
