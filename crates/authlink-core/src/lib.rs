//! authlink core library.
//!
//! Bearer-token glue for talking to a JSON API: a cookie-backed store for the
//! access token, and an HTTP client that attaches the token to every request
//! and refreshes it once when the server rejects it.
//!
//! ```no_run
//! use authlink_core::{ApiClients, ClientConfig, TokenStore};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let clients = ApiClients::new(ClientConfig::default(), TokenStore::in_memory())?;
//! let _profile: serde_json::Value = clients.with_auth.get("profile").await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;

pub use api::{ApiClient, ApiClients, ApiError, ApiRequest};
pub use auth::{AuthService, CookieJar, RefreshError, TokenRefresher, TokenStore};
pub use config::{ClientConfig, CookieOptions};
