//! Request descriptors for the authenticated pipeline.

use std::time::Duration;

use reqwest::Method;
use serde::Serialize;

use super::ApiError;

/// A logical call to the scoring service, independent of credentials.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    body: Option<serde_json::Value>,
    timeout: Option<Duration>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// POST with a JSON body.
    pub fn post_json<B: Serialize>(path: impl Into<String>, body: &B) -> Result<Self, ApiError> {
        let body = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidRequest(format!("Failed to serialize body: {}", e)))?;
        Ok(Self {
            body: Some(body),
            ..Self::post(path)
        })
    }

    /// Override the client-wide timeout for this call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Initial,
    Retried,
}

/// An in-flight call plus how many times it has been sent.
///
/// Built once per logical call; the retry path produces a new value instead
/// of mutating the original request.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    request: ApiRequest,
    attempt: Attempt,
}

impl PendingRequest {
    pub fn new(request: ApiRequest) -> Self {
        Self {
            request,
            attempt: Attempt::Initial,
        }
    }

    pub fn request(&self) -> &ApiRequest {
        &self.request
    }

    pub fn attempt(&self) -> Attempt {
        self.attempt
    }

    pub fn is_retried(&self) -> bool {
        self.attempt == Attempt::Retried
    }

    /// The same request, marked as its one permitted retry.
    pub fn into_retry(self) -> Self {
        Self {
            attempt: Attempt::Retried,
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_post_json_keeps_body() {
        let request = ApiRequest::post_json("/predict/sms", &json!({"message": "hi"})).unwrap();
        assert_eq!(request.method(), &Method::POST);
        assert_eq!(request.path(), "/predict/sms");
        assert_eq!(request.body(), Some(&json!({"message": "hi"})));
        assert_eq!(request.timeout(), None);
    }

    #[test]
    fn test_into_retry_marks_attempt() {
        let pending = PendingRequest::new(ApiRequest::get("/health/"));
        assert_eq!(pending.attempt(), Attempt::Initial);
        assert!(!pending.is_retried());

        let retry = pending.into_retry();
        assert!(retry.is_retried());
        assert_eq!(retry.request().path(), "/health/");
    }
}
