//! Core library for SafeGuard AI clients.
//!
//! This crate owns everything with contractual behavior on the client side:
//!
//! - `auth`: the credential triple persisted across restarts, the in-memory
//!   session and the login / refresh / logout state machine
//! - `api`: the HTTP transport, the authenticated request pipeline with its
//!   single refresh-and-retry, and the scan endpoints built on top of it
//! - `config`: user configuration with environment overrides
//! - `models`: request and response bodies for the scan endpoints
//!
//! Front ends (the terminal client, any GUI) only issue requests through
//! [`api::RequestPipeline`] and render whatever comes back.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

mod lock_ext;

pub use api::{ApiClient, ApiError, ApiRequest, RequestPipeline};
pub use auth::{
    AuthError, CredentialStore, RefreshError, Session, SessionManager, SessionSnapshot,
    SessionState, SessionUpdate, StoreError, StoredCredential,
};
pub use config::{Config, CredentialBackend};
