//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use safeguard_core::auth::{CredentialStore, MemoryBackend, Session, SessionManager, StoredCredential};
use safeguard_core::{ApiClient, RequestPipeline};

pub const DEMO_USER: &str = "demo@safeguard.ai";
pub const DEMO_PASSWORD: &str = "demo123";
pub const DEMO_USER_ID: i64 = 1;

/// A pipeline wired to a mock scoring service and an in-memory store.
pub struct Harness {
    pub server: MockServer,
    pub pipeline: RequestPipeline,
    pub backend: MemoryBackend,
}

impl Harness {
    pub async fn start() -> Self {
        Self::with_logout_timeout(Duration::from_secs(5)).await
    }

    pub async fn with_logout_timeout(logout_timeout: Duration) -> Self {
        let server = MockServer::start().await;
        let backend = MemoryBackend::default();
        let client = ApiClient::new(&server.uri(), Duration::from_secs(5)).expect("client");
        let session = SessionManager::with_logout_timeout(
            client.clone(),
            CredentialStore::new(backend.clone()),
            logout_timeout,
        );
        Self {
            server,
            pipeline: RequestPipeline::new(client, session),
            backend,
        }
    }

    pub fn session(&self) -> &SessionManager {
        self.pipeline.session()
    }

    /// What the credential store currently holds.
    pub fn stored(&self) -> Option<StoredCredential> {
        CredentialStore::new(self.backend.clone()).load().expect("memory store never fails")
    }

    pub async fn mount_login(&self, token: &str) {
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(login_body(token)))
            .mount(&self.server)
            .await;
    }

    /// Log the demo user in with `token` as the issued credential.
    pub async fn login(&self, token: &str) -> Session {
        self.mount_login(token).await;
        self.session()
            .login(DEMO_USER, DEMO_PASSWORD)
            .await
            .expect("login succeeds")
    }
}

pub fn login_body(token: &str) -> serde_json::Value {
    json!({
        "access_token": token,
        "token_type": "bearer",
        "user_id": DEMO_USER_ID,
        "email": DEMO_USER,
    })
}

pub fn refresh_body(token: &str) -> serde_json::Value {
    json!({ "access_token": token, "token_type": "bearer" })
}

pub fn prediction_body() -> serde_json::Value {
    json!({
        "is_fraud": true,
        "confidence": 0.91,
        "risk_score": 0.87,
        "explanation": "Prize claim with urgent call to action",
        "blockchain_hash": "0xabc123",
    })
}

pub fn demo_credential(token: &str) -> StoredCredential {
    StoredCredential {
        token: token.to_string(),
        user_id: DEMO_USER_ID,
        email: DEMO_USER.to_string(),
    }
}
