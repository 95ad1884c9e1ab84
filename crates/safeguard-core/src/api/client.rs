//! HTTP transport for the SafeGuard AI scoring service.
//!
//! `ApiClient` knows the endpoints and how to classify responses, but holds
//! no credential of its own: every authenticated call takes the bearer token
//! as an argument, read from the session at send time.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Client, Response};
use serde::Deserialize;
use tracing::debug;

use super::request::PendingRequest;
use super::ApiError;
use crate::auth::AuthError;
use crate::config::Config;

// ============================================================================
// Constants
// ============================================================================

const LOGIN_PATH: &str = "/auth/login";
const REFRESH_PATH: &str = "/auth/refresh";
const LOGOUT_PATH: &str = "/auth/logout";

/// Shown when a login is rejected without a usable message from the service.
pub const GENERIC_LOGIN_FAILURE: &str = "Login failed. Please check your credentials.";

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub user_id: i64,
    pub email: String,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(default)]
    access_token: Option<String>,
}

/// Transport client. Clone is cheap - reqwest::Client uses Arc internally
/// for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Arc<str>,
}

impl ApiClient {
    /// Create a client for `base_url` with a fixed per-request timeout
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::NetworkError)?;

        Ok(Self {
            client,
            base_url: Arc::from(base_url.trim_end_matches('/')),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        Self::new(config.api_base_url(), config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Exchange username and password for a token and identity.
    ///
    /// A 4xx rejection becomes `AuthError::Authentication` carrying the
    /// service's `detail` message when it sent one.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<LoginResponse, AuthError> {
        let response = self
            .client
            .post(self.url(LOGIN_PATH))
            .header(header::ACCEPT, "application/json")
            .form(&[("username", username), ("password", password)])
            .send()
            .await
            .map_err(ApiError::from)?;

        let status = response.status();
        if status.is_success() {
            let login: LoginResponse = response.json().await.map_err(ApiError::from)?;
            if login.access_token.is_empty() {
                return Err(ApiError::InvalidResponse(
                    "Login response did not include an access token".to_string(),
                )
                .into());
            }
            return Ok(login);
        }

        let body = response.text().await.unwrap_or_default();
        let code = status.as_u16();
        if status.is_client_error() && code != 404 && code != 429 {
            return Err(AuthError::Authentication(login_failure_message(&body)));
        }
        Err(ApiError::from_status(status, &body).into())
    }

    /// Ask the service for a new token using the current one.
    pub async fn refresh(&self, token: &str) -> Result<String, ApiError> {
        let response = self
            .client
            .post(self.url(REFRESH_PATH))
            .bearer_auth(token)
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        let refreshed: RefreshResponse = response.json().await?;

        refreshed
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ApiError::InvalidResponse("Refresh response did not include an access token".to_string())
            })
    }

    /// Tell the service the session is over. The response body is ignored.
    pub async fn logout(&self, token: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url(LOGOUT_PATH))
            .bearer_auth(token)
            .send()
            .await?;

        Self::check_response(response).await?;
        Ok(())
    }

    /// Send one attempt of a pending request, with the given bearer token if any.
    pub async fn send(&self, pending: &PendingRequest, token: Option<&str>) -> Result<Response, ApiError> {
        let request = pending.request();
        let mut builder = self
            .client
            .request(request.method().clone(), self.url(request.path()));

        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }
        if let Some(timeout) = request.timeout() {
            builder = builder.timeout(timeout);
        }

        debug!(
            method = %request.method(),
            path = request.path(),
            attempt = ?pending.attempt(),
            authenticated = token.is_some(),
            "Sending request"
        );

        let response = builder.send().await?;
        let response = Self::check_response(response).await?;
        debug!(path = request.path(), status = %response.status(), "Response received");
        Ok(response)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }
}

/// Pull a human-readable message out of a rejected login body.
fn login_failure_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return GENERIC_LOGIN_FAILURE.to_string();
    };

    ["detail", "message", "error"]
        .iter()
        .filter_map(|key| value.get(*key))
        .find_map(|v| v.as_str())
        .map(str::trim)
        .filter(|msg| !msg.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| GENERIC_LOGIN_FAILURE.to_string())
}
