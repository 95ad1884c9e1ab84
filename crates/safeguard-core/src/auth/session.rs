use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::credentials::StoredCredential;

/// Lifecycle of the in-memory session.
///
/// There is no externally visible `Expired` state: a failed refresh goes
/// straight back to `Unauthenticated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Unauthenticated,
    Authenticating,
    Authenticated,
    Refreshing,
}

impl SessionState {
    /// True while a bearer token is held (and mirrored in storage).
    pub fn has_credential(self) -> bool {
        matches!(self, SessionState::Authenticated | SessionState::Refreshing)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Unauthenticated => "unauthenticated",
            SessionState::Authenticating => "authenticating",
            SessionState::Authenticated => "authenticated",
            SessionState::Refreshing => "refreshing",
        };
        f.write_str(label)
    }
}

#[derive(Clone, PartialEq, Serialize)]
pub struct Session {
    #[serde(skip_serializing)]
    pub token: String,
    pub user_id: i64,
    pub email: String,
    pub authenticated_at: DateTime<Utc>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(token: String, user_id: i64, email: String) -> Self {
        Self {
            token,
            user_id,
            email,
            authenticated_at: Utc::now(),
            refreshed_at: None,
        }
    }

    /// Session rebuilt from storage at startup.
    pub fn from_stored(credential: StoredCredential) -> Self {
        Self::new(credential.token, credential.user_id, credential.email)
    }

    /// Same identity, new token.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            token,
            refreshed_at: Some(Utc::now()),
            ..self.clone()
        }
    }

    pub fn credential(&self) -> StoredCredential {
        StoredCredential {
            token: self.token.clone(),
            user_id: self.user_id,
            email: self.email.clone(),
        }
    }

    /// Minutes since the current token was issued (for display)
    pub fn token_age_minutes(&self) -> i64 {
        let issued = self.refreshed_at.unwrap_or(self.authenticated_at);
        (Utc::now() - issued).num_minutes().max(0)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("authenticated_at", &self.authenticated_at)
            .field("refreshed_at", &self.refreshed_at)
            .finish()
    }
}

/// Fields to merge into the current session. `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    pub token: Option<String>,
    pub user_id: Option<i64>,
    pub email: Option<String>,
}

impl SessionUpdate {
    pub(crate) fn apply_to(self, session: &Session) -> Session {
        let mut merged = match self.token {
            Some(token) if token != session.token => session.with_token(token),
            _ => session.clone(),
        };
        if let Some(user_id) = self.user_id {
            merged.user_id = user_id;
        }
        if let Some(email) = self.email {
            merged.email = email;
        }
        merged
    }
}

/// Point-in-time view of the session, returned without waiting on any call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub session: Option<Session>,
}

impl SessionSnapshot {
    pub fn is_authenticated(&self) -> bool {
        self.state.has_credential() && self.session.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session() -> Session {
        Session::new("T1".to_string(), 1, "demo@safeguard.ai".to_string())
    }

    #[test]
    fn test_with_token_keeps_identity() {
        let original = session();
        let refreshed = original.with_token("T2".to_string());

        assert_eq!(refreshed.token, "T2");
        assert_eq!(refreshed.user_id, original.user_id);
        assert_eq!(refreshed.email, original.email);
        assert_eq!(refreshed.authenticated_at, original.authenticated_at);
        assert!(refreshed.refreshed_at.is_some());
    }

    #[test]
    fn test_update_merges_only_given_fields() {
        let update = SessionUpdate {
            email: Some("new@safeguard.ai".to_string()),
            ..SessionUpdate::default()
        };
        let merged = update.apply_to(&session());

        assert_eq!(merged.token, "T1");
        assert_eq!(merged.user_id, 1);
        assert_eq!(merged.email, "new@safeguard.ai");
        assert!(merged.refreshed_at.is_none());
    }

    #[test]
    fn test_update_with_same_token_is_not_a_refresh() {
        let update = SessionUpdate {
            token: Some("T1".to_string()),
            ..SessionUpdate::default()
        };
        assert!(update.apply_to(&session()).refreshed_at.is_none());
    }

    #[test]
    fn test_token_age_uses_latest_issue_time() {
        let mut s = session();
        s.authenticated_at = Utc::now() - Duration::minutes(90);
        assert!(s.token_age_minutes() >= 89);

        s.refreshed_at = Some(Utc::now() - Duration::minutes(5));
        assert!(s.token_age_minutes() <= 6);
    }

    #[test]
    fn test_serialize_skips_token() {
        let json = serde_json::to_string(&session()).unwrap();
        assert!(!json.contains("T1"));
        assert!(json.contains("demo@safeguard.ai"));
    }

    #[test]
    fn test_state_has_credential() {
        assert!(!SessionState::Unauthenticated.has_credential());
        assert!(!SessionState::Authenticating.has_credential());
        assert!(SessionState::Authenticated.has_credential());
        assert!(SessionState::Refreshing.has_credential());
    }
}
