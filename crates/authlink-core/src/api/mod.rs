//! HTTP client module.
//!
//! This module provides the `ApiClient` and the `ApiClients` pair (one plain
//! client, one that attaches and refreshes bearer tokens), the immutable
//! `ApiRequest` value they send, and the `ApiError` taxonomy.

pub mod client;
pub mod error;
pub mod interceptor;
pub mod request;

pub use client::{ApiClient, ApiClients};
pub use error::{ApiError, AuthFailure};
pub use interceptor::{AuthInterceptor, Recovery, MAX_AUTH_RETRIES};
pub use request::ApiRequest;
