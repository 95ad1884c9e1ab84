use thiserror::Error;

use super::credentials::StoreError;
use crate::api::ApiError;

/// Failures of login, session updates and restoring from storage.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The service rejected the credentials. Carries its message when it sent one.
    #[error("{0}")]
    Authentication(String),

    #[error("Login request failed: {0}")]
    Transport(#[from] ApiError),

    #[error("Failed to persist credentials: {0}")]
    Storage(#[from] StoreError),

    #[error("Not logged in")]
    NotAuthenticated,

    #[error("Token must not be empty")]
    EmptyToken,

    #[error("Superseded by a newer login or logout")]
    Superseded,
}

/// Outcome of a failed refresh.
///
/// Cloneable so that every caller joined on one in-flight refresh receives
/// the same failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("No active session to refresh")]
    NotAuthenticated,

    #[error("Token refresh rejected: {0}")]
    Rejected(String),

    #[error("Session ended while the refresh was in flight")]
    Superseded,

    #[error("Failed to persist refreshed token: {0}")]
    Storage(String),
}
