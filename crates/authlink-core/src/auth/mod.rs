//! Authentication module for token storage and renewal.
//!
//! This module provides:
//! - `CookieJar`: Named cookie storage with expiry, optionally persisted to disk
//! - `TokenStore`: The access token kept in a single cookie
//! - `TokenRefresher` / `SingleFlightRefresh`: Token renewal, one call at a time
//! - `AuthService`: Login, registration, refresh and logout endpoints
//!
//! The access token cookie expires one day after it is written.

pub mod cookies;
pub mod refresh;
pub mod service;
pub mod token_store;

pub use cookies::{CookieJar, SameSite, StoredCookie};
pub use refresh::{RefreshError, SingleFlightRefresh, TokenRefresher};
pub use service::{AuthMode, AuthResponse, AuthService};
pub use token_store::{TokenKind, TokenStore};
