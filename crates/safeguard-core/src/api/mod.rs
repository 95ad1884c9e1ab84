//! REST API module for the SafeGuard AI scoring service.
//!
//! This module provides:
//! - `ApiClient`: the transport, with the login / refresh / logout endpoints
//! - `RequestPipeline`: authenticated calls with one refresh-and-retry
//! - `ApiError`: the error taxonomy every call is classified into
//!
//! The service uses JWT bearer tokens obtained from `/auth/login`.

pub mod client;
mod endpoints;
pub mod error;
pub mod pipeline;
pub mod request;

pub use client::{ApiClient, LoginResponse};
pub use error::ApiError;
pub use pipeline::RequestPipeline;
pub use request::{ApiRequest, Attempt, PendingRequest};
