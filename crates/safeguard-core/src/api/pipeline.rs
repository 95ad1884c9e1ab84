//! Authenticated request pipeline.
//!
//! Every outbound call reads the current bearer token from the
//! `SessionManager` at send time. A call rejected as unauthorized is retried
//! exactly once, after the session has been refreshed; concurrent rejections
//! share the same refresh.

use anyhow::Result;
use reqwest::Response;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::request::{ApiRequest, PendingRequest};
use super::{ApiClient, ApiError};
use crate::auth::SessionManager;
use crate::config::Config;

/// Clone is cheap: both halves are shared handles.
#[derive(Clone)]
pub struct RequestPipeline {
    client: ApiClient,
    session: SessionManager,
}

impl RequestPipeline {
    pub fn new(client: ApiClient, session: SessionManager) -> Self {
        Self { client, session }
    }

    /// Compose client, credential store and session from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = ApiClient::from_config(config)?;
        let store = config.open_credential_store()?;
        let session = SessionManager::with_logout_timeout(client.clone(), store, config.logout_timeout());
        Ok(Self::new(client, session))
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Send a request, refreshing and retrying once on an authorization failure.
    pub async fn execute(&self, request: ApiRequest) -> Result<Response, ApiError> {
        let mut pending = PendingRequest::new(request);
        let mut token = self.session.bearer_token();

        loop {
            let err = match self.client.send(&pending, token.as_deref()).await {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };

            if !err.is_unauthorized() {
                return Err(err);
            }
            if pending.is_retried() {
                warn!(path = pending.request().path(), "Request rejected again after refresh");
                return Err(ApiError::AuthorizationFailed);
            }
            // Nothing to refresh when the request went out without a credential.
            let Some(rejected) = token else {
                return Err(err);
            };

            debug!(path = pending.request().path(), "Request unauthorized, refreshing session");
            let refreshed = self.session.refresh_after_rejection(&rejected).await?;
            token = Some(refreshed);
            pending = pending.into_retry();
        }
    }

    /// `execute` and decode the JSON response body.
    pub async fn execute_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let path = request.path().to_string();
        let response = self.execute(request).await?;
        response.json().await.map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", path, e))
        })
    }
}
