//! The session state machine.
//!
//! `SessionManager` is the only writer of the current credential. It keeps
//! the in-memory session and the `CredentialStore` consistent:
//!
//! - `Authenticated` / `Refreshing`: a non-empty token, mirrored in storage
//! - `Unauthenticated`: no session in memory, nothing in storage
//!
//! Concurrent `refresh()` calls share one in-flight refresh, which runs on
//! its own task so it completes even if every caller waiting on it goes away.
//! A generation counter, bumped by every login, logout and forced logout,
//! keeps a slow login or refresh from writing over a session that has since
//! ended.
//!
//! Lock order is `persist`, then `refresh_flight`, then `current`. Storage
//! I/O happens under `persist` only, so readers of `current` never wait on
//! the disk or the keychain.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::credentials::{CredentialStore, StoreError};
use super::error::{AuthError, RefreshError};
use super::session::{Session, SessionSnapshot, SessionState, SessionUpdate};
use crate::api::ApiClient;
use crate::config::DEFAULT_LOGOUT_TIMEOUT_SECS;
use crate::lock_ext::{MutexExt, RwLockExt};

type RefreshOutcome = Shared<BoxFuture<'static, Result<Session, RefreshError>>>;

/// The refresh currently running, and the session token it is replacing.
struct RefreshFlight {
    generation: u64,
    token: String,
    outcome: RefreshOutcome,
}

impl RefreshFlight {
    fn replaces(&self, generation: u64, token: &str) -> bool {
        self.generation == generation && self.token == token
    }
}

#[derive(Default)]
struct Current {
    state: SessionState,
    session: Option<Session>,
    generation: u64,
}

impl Current {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            session: self.session.clone(),
        }
    }

    /// Generation and token of a session that may be refreshed.
    fn refreshable(&self) -> Option<(u64, &str)> {
        match (self.state, self.session.as_ref()) {
            (SessionState::Authenticated | SessionState::Refreshing, Some(session)) => {
                Some((self.generation, session.token.as_str()))
            }
            _ => None,
        }
    }
}

struct Inner {
    client: ApiClient,
    store: CredentialStore,
    current: RwLock<Current>,
    /// Held across every credential write so storage changes land in the
    /// same order as session changes.
    persist: Mutex<()>,
    refresh_flight: Mutex<Option<RefreshFlight>>,
    state_tx: watch::Sender<SessionState>,
    logout_timeout: Duration,
}

/// Owner of the session. Clone is cheap and every clone shares the same state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(client: ApiClient, store: CredentialStore) -> Self {
        Self::with_logout_timeout(client, store, Duration::from_secs(DEFAULT_LOGOUT_TIMEOUT_SECS))
    }

    pub fn with_logout_timeout(client: ApiClient, store: CredentialStore, logout_timeout: Duration) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Unauthenticated);
        Self {
            inner: Arc::new(Inner {
                client,
                store,
                current: RwLock::new(Current::default()),
                persist: Mutex::new(()),
                refresh_flight: Mutex::new(None),
                state_tx,
                logout_timeout,
            }),
        }
    }

    /// Pick up a credential persisted by a previous run.
    pub fn restore(&self) -> Result<Option<Session>, StoreError> {
        let _persist = self.inner.persist.lock_or_recover();
        let stored = self.inner.store.load()?;

        let mut current = self.inner.current.write_or_recover();
        current.generation += 1;
        match stored {
            Some(credential) => {
                let session = Session::from_stored(credential);
                info!(user_id = session.user_id, "Restored session from storage");
                current.session = Some(session.clone());
                self.inner.set_state(&mut current, SessionState::Authenticated);
                Ok(Some(session))
            }
            None => {
                debug!("No stored session");
                current.session = None;
                self.inner.set_state(&mut current, SessionState::Unauthenticated);
                Ok(None)
            }
        }
    }

    /// Log in, superseding any existing session.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, AuthError> {
        let generation = {
            let mut current = self.inner.current.write_or_recover();
            if current.state.has_credential() {
                debug!("Login while authenticated, superseding the current session");
            }
            current.generation += 1;
            current.session = None;
            self.inner.set_state(&mut current, SessionState::Authenticating);
            current.generation
        };

        let result = self.inner.client.authenticate(username, password).await;

        let _persist = self.inner.persist.lock_or_recover();
        if self.inner.current.read_or_recover().generation != generation {
            debug!("Login finished after a newer login or logout, discarding");
            return Err(AuthError::Superseded);
        }

        let login = match result {
            Ok(login) => login,
            Err(e) => {
                info!(error = %e, "Login failed");
                self.inner.end_session(Some(generation));
                return Err(e);
            }
        };

        let session = Session::new(login.access_token, login.user_id, login.email);
        if let Err(e) = self.inner.store.save(&session.credential()) {
            warn!(error = %e, "Failed to persist credentials after login");
            self.inner.end_session(Some(generation));
            return Err(AuthError::Storage(e));
        }

        let mut current = self.inner.current.write_or_recover();
        if current.generation != generation {
            debug!("Login superseded while persisting, discarding");
            return Err(AuthError::Superseded);
        }
        info!(user_id = session.user_id, "Logged in");
        current.session = Some(session.clone());
        self.inner.set_state(&mut current, SessionState::Authenticated);
        Ok(session)
    }

    /// End the session. The local teardown happens before the first await,
    /// so the manager is `Unauthenticated` with storage cleared even if this
    /// future is dropped while the remote notify is outstanding.
    pub async fn logout(&self) {
        let ended = {
            let _persist = self.inner.persist.lock_or_recover();
            self.inner.end_session(None)
        };
        info!("Logged out");

        let Some(session) = ended else {
            return;
        };
        match tokio::time::timeout(self.inner.logout_timeout, self.inner.client.logout(&session.token)).await {
            Ok(Ok(())) => debug!("Remote logout acknowledged"),
            Ok(Err(e)) => warn!(error = %e, "Remote logout failed, local session already cleared"),
            Err(_) => warn!(
                timeout_ms = self.inner.logout_timeout.as_millis() as u64,
                "Remote logout timed out, local session already cleared"
            ),
        }
    }

    /// Refresh the token. Callers arriving while a refresh is in flight join
    /// it and receive the same outcome; only one remote call is made.
    pub async fn refresh(&self) -> Result<Session, RefreshError> {
        let outcome = {
            let mut slot = self.inner.refresh_flight.lock_or_recover();
            let (generation, token) = {
                let current = self.inner.current.read_or_recover();
                let Some((generation, token)) = current.refreshable() else {
                    return Err(RefreshError::NotAuthenticated);
                };
                (generation, token.to_string())
            };
            self.inner.join_or_start(&mut slot, generation, token)
        };
        outcome.await
    }

    /// Token to retry with after a request was rejected while carrying
    /// `rejected_token`. Refreshes only when that token is still current.
    pub async fn refresh_after_rejection(&self, rejected_token: &str) -> Result<String, RefreshError> {
        let outcome = {
            // The slot is held across the check so a refresh cannot commit
            // between it and joining.
            let mut slot = self.inner.refresh_flight.lock_or_recover();
            let (generation, token) = {
                let current = self.inner.current.read_or_recover();
                let Some((generation, token)) = current.refreshable() else {
                    return Err(RefreshError::NotAuthenticated);
                };
                if token != rejected_token {
                    debug!("Rejected token was already replaced, retrying with the current one");
                    return Ok(token.to_string());
                }
                (generation, token.to_string())
            };
            self.inner.join_or_start(&mut slot, generation, token)
        };
        outcome.await.map(|session| session.token)
    }

    /// Merge fields into the in-memory session. Storage is rewritten only
    /// when the token changes.
    pub fn update_user(&self, update: SessionUpdate) -> Result<Session, AuthError> {
        if update.token.as_deref().is_some_and(str::is_empty) {
            return Err(AuthError::EmptyToken);
        }

        let _persist = self.inner.persist.lock_or_recover();
        let (generation, merged, token_changed) = {
            let current = self.inner.current.read_or_recover();
            if !current.state.has_credential() {
                return Err(AuthError::NotAuthenticated);
            }
            let Some(session) = current.session.as_ref() else {
                return Err(AuthError::NotAuthenticated);
            };
            let token_changed = update.token.as_ref().is_some_and(|t| *t != session.token);
            (current.generation, update.apply_to(session), token_changed)
        };

        if token_changed {
            self.inner.store.save(&merged.credential())?;
        }

        let mut current = self.inner.current.write_or_recover();
        if current.generation != generation {
            return Err(AuthError::Superseded);
        }
        current.session = Some(merged.clone());
        Ok(merged)
    }

    pub fn get_session(&self) -> SessionSnapshot {
        self.inner.current.read_or_recover().snapshot()
    }

    pub fn state(&self) -> SessionState {
        self.inner.current.read_or_recover().state
    }

    /// The token to attach to an outbound request, if a session is held.
    pub fn bearer_token(&self) -> Option<String> {
        let current = self.inner.current.read_or_recover();
        if current.state.has_credential() {
            current.session.as_ref().map(|s| s.token.clone())
        } else {
            None
        }
    }

    /// Watch state changes, including forced logout after a failed refresh.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state_tx.subscribe()
    }
}

impl Inner {
    fn set_state(&self, current: &mut Current, state: SessionState) {
        current.state = state;
        self.state_tx.send_replace(state);
    }

    /// Drop the session and clear storage, invalidating anything in flight.
    /// With `expected`, does nothing when a newer login or logout has already
    /// taken over. Callers hold `persist`.
    fn end_session(&self, expected: Option<u64>) -> Option<Session> {
        let ended = {
            let mut current = self.current.write_or_recover();
            if expected.is_some_and(|generation| generation != current.generation) {
                return None;
            }
            current.generation += 1;
            let ended = current.session.take();
            self.set_state(&mut current, SessionState::Unauthenticated);
            ended
        };
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear stored credentials");
        }
        ended
    }

    /// Join the refresh replacing `token`, or spawn one. The refresh runs
    /// on its own task; waiters only observe its outcome.
    fn join_or_start(
        self: &Arc<Self>,
        slot: &mut Option<RefreshFlight>,
        generation: u64,
        token: String,
    ) -> RefreshOutcome {
        if let Some(flight) = slot.as_ref().filter(|f| f.replaces(generation, &token)) {
            debug!("Joining in-flight token refresh");
            return flight.outcome.clone();
        }

        let task = tokio::spawn(Arc::clone(self).run_refresh(generation, token.clone()));
        let inner = Arc::clone(self);
        let replaced = token.clone();
        let outcome = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    error!(error = %e, "Token refresh task did not complete");
                    inner.clear_flight(generation, &replaced);
                    Err(RefreshError::Rejected(format!("refresh task failed: {}", e)))
                }
            }
        }
        .boxed()
        .shared();

        *slot = Some(RefreshFlight {
            generation,
            token,
            outcome: outcome.clone(),
        });
        outcome
    }

    fn clear_flight(&self, generation: u64, token: &str) {
        let mut slot = self.refresh_flight.lock_or_recover();
        if slot.as_ref().is_some_and(|f| f.replaces(generation, token)) {
            *slot = None;
        }
    }

    async fn run_refresh(self: Arc<Self>, generation: u64, token: String) -> Result<Session, RefreshError> {
        let result = self.perform_refresh(generation, &token).await;
        self.clear_flight(generation, &token);
        result
    }

    async fn perform_refresh(&self, generation: u64, token: &str) -> Result<Session, RefreshError> {
        {
            let mut current = self.current.write_or_recover();
            match current.refreshable() {
                Some((g, current_token)) if g == generation && current_token == token => {}
                Some(_) => return Err(RefreshError::Superseded),
                None => return Err(RefreshError::NotAuthenticated),
            }
            self.set_state(&mut current, SessionState::Refreshing);
        }

        info!("Refreshing access token");
        let result = self.client.refresh(token).await;

        let _persist = self.persist.lock_or_recover();
        let session = {
            let current = self.current.read_or_recover();
            if current.generation != generation {
                debug!("Session ended while refreshing, discarding refresh result");
                return Err(RefreshError::Superseded);
            }
            current.session.clone()
        };

        let new_token = match result {
            Ok(new_token) => new_token,
            Err(e) => {
                warn!(error = %e, "Token refresh failed, forcing logout");
                self.end_session(Some(generation));
                return Err(RefreshError::Rejected(e.to_string()));
            }
        };

        let Some(refreshed) = session.map(|s| s.with_token(new_token)) else {
            self.end_session(Some(generation));
            return Err(RefreshError::NotAuthenticated);
        };

        if let Err(e) = self.store.save(&refreshed.credential()) {
            warn!(error = %e, "Failed to persist refreshed token, forcing logout");
            self.end_session(Some(generation));
            return Err(RefreshError::Storage(e.to_string()));
        }

        let mut current = self.current.write_or_recover();
        if current.generation != generation {
            debug!("Session ended while persisting refreshed token, discarding");
            return Err(RefreshError::Superseded);
        }
        info!(user_id = refreshed.user_id, "Access token refreshed");
        current.session = Some(refreshed.clone());
        self.set_state(&mut current, SessionState::Authenticated);
        Ok(refreshed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{KeyValueBackend, MemoryBackend, StoredCredential};

    /// Points at a port nothing listens on; these tests never reach the network.
    fn offline_manager(backend: MemoryBackend) -> SessionManager {
        let client = ApiClient::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        SessionManager::new(client, CredentialStore::new(backend))
    }

    fn seed(backend: &MemoryBackend) {
        CredentialStore::new(backend.clone())
            .save(&StoredCredential {
                token: "T1".to_string(),
                user_id: 3,
                email: "demo@safeguard.ai".to_string(),
            })
            .unwrap();
    }

    #[test]
    fn test_initial_state_is_unauthenticated() {
        let manager = offline_manager(MemoryBackend::default());
        let snapshot = manager.get_session();
        assert_eq!(snapshot.state, SessionState::Unauthenticated);
        assert!(snapshot.session.is_none());
        assert_eq!(manager.bearer_token(), None);
    }

    #[test]
    fn test_restore_from_storage() {
        let backend = MemoryBackend::default();
        seed(&backend);
        let manager = offline_manager(backend);

        let restored = manager.restore().unwrap().expect("stored session");
        assert_eq!(restored.user_id, 3);
        assert_eq!(manager.state(), SessionState::Authenticated);
        assert_eq!(manager.bearer_token().as_deref(), Some("T1"));
        assert_eq!(*manager.subscribe().borrow(), SessionState::Authenticated);
    }

    #[test]
    fn test_restore_ignores_partial_credential() {
        let backend = MemoryBackend::default();
        backend.set("token", "T1").unwrap();
        let manager = offline_manager(backend);

        assert!(manager.restore().unwrap().is_none());
        assert_eq!(manager.state(), SessionState::Unauthenticated);
    }

    #[test]
    fn test_update_user_without_session() {
        let manager = offline_manager(MemoryBackend::default());
        let update = SessionUpdate {
            email: Some("x@safeguard.ai".to_string()),
            ..SessionUpdate::default()
        };
        assert!(matches!(manager.update_user(update), Err(AuthError::NotAuthenticated)));
    }

    #[test]
    fn test_update_user_email_is_memory_only() {
        let backend = MemoryBackend::default();
        seed(&backend);
        let manager = offline_manager(backend.clone());
        manager.restore().unwrap();

        let updated = manager
            .update_user(SessionUpdate {
                email: Some("renamed@safeguard.ai".to_string()),
                ..SessionUpdate::default()
            })
            .unwrap();

        assert_eq!(updated.email, "renamed@safeguard.ai");
        assert_eq!(backend.get("user_email").unwrap().as_deref(), Some("demo@safeguard.ai"));
    }

    #[test]
    fn test_update_user_token_is_persisted() {
        let backend = MemoryBackend::default();
        seed(&backend);
        let manager = offline_manager(backend.clone());
        manager.restore().unwrap();

        manager
            .update_user(SessionUpdate {
                token: Some("T9".to_string()),
                ..SessionUpdate::default()
            })
            .unwrap();

        assert_eq!(manager.bearer_token().as_deref(), Some("T9"));
        assert_eq!(backend.get("token").unwrap().as_deref(), Some("T9"));
    }

    #[test]
    fn test_update_user_rejects_empty_token() {
        let backend = MemoryBackend::default();
        seed(&backend);
        let manager = offline_manager(backend);
        manager.restore().unwrap();

        let update = SessionUpdate {
            token: Some(String::new()),
            ..SessionUpdate::default()
        };
        assert!(matches!(manager.update_user(update), Err(AuthError::EmptyToken)));
        assert_eq!(manager.bearer_token().as_deref(), Some("T1"));
    }

    #[tokio::test]
    async fn test_refresh_without_session_makes_no_call() {
        let manager = offline_manager(MemoryBackend::default());
        assert_eq!(manager.refresh().await, Err(RefreshError::NotAuthenticated));
        assert_eq!(
            manager.refresh_after_rejection("T1").await,
            Err(RefreshError::NotAuthenticated)
        );
    }

    #[tokio::test]
    async fn test_refresh_after_rejection_skips_stale_token() {
        let backend = MemoryBackend::default();
        seed(&backend);
        let manager = offline_manager(backend);
        manager.restore().unwrap();

        // T0 is not the current token, so no refresh (and no network) is needed.
        assert_eq!(manager.refresh_after_rejection("T0").await.unwrap(), "T1");
        assert_eq!(manager.state(), SessionState::Authenticated);
    }

    /// Blocks inside the token write until the test releases it.
    struct GatedBackend {
        inner: MemoryBackend,
        entered: std::sync::mpsc::SyncSender<()>,
        release: Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl KeyValueBackend for GatedBackend {
        fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
            if key == "token" && value == "T9" {
                let _ = self.entered.send(());
                let _ = self.release.lock().unwrap().recv();
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), StoreError> {
            self.inner.remove(key)
        }
    }

    #[test]
    fn test_readers_do_not_wait_on_storage_writes() {
        let backend = MemoryBackend::default();
        seed(&backend);
        let (entered_tx, entered_rx) = std::sync::mpsc::sync_channel(1);
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let gated = GatedBackend {
            inner: backend,
            entered: entered_tx,
            release: Mutex::new(release_rx),
        };
        let client = ApiClient::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        let manager = SessionManager::new(client, CredentialStore::new(gated));
        manager.restore().unwrap();

        let writer = {
            let manager = manager.clone();
            std::thread::spawn(move || {
                manager.update_user(SessionUpdate {
                    token: Some("T9".to_string()),
                    ..SessionUpdate::default()
                })
            })
        };

        entered_rx.recv().unwrap();
        // The write is parked inside the backend; the session is still readable.
        assert_eq!(manager.get_session().state, SessionState::Authenticated);
        assert_eq!(manager.bearer_token().as_deref(), Some("T1"));

        release_tx.send(()).unwrap();
        writer.join().unwrap().unwrap();
        assert_eq!(manager.bearer_token().as_deref(), Some("T9"));
    }

    #[tokio::test]
    async fn test_logout_without_session_clears_storage() {
        let backend = MemoryBackend::default();
        backend.set("user_email", "left@behind.ai").unwrap();
        let manager = offline_manager(backend.clone());

        manager.logout().await;

        assert_eq!(manager.state(), SessionState::Unauthenticated);
        assert!(backend.is_empty());
    }
}
