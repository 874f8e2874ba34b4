use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{Duration, Utc};
use tracing::debug;

use crate::config::CookieOptions;

use super::cookies::{CookieJar, StoredCookie};

/// Cookie names for the two tokens issued by the auth backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    AccessToken,
    /// Set by the server as its own cookie and sent back on refresh; the
    /// store never reads or writes it.
    RefreshToken,
}

impl TokenKind {
    pub fn cookie_name(self) -> &'static str {
        match self {
            TokenKind::AccessToken => "accessToken",
            TokenKind::RefreshToken => "refreshToken",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cookie_name())
    }
}

/// Access token persisted as a single cookie.
///
/// Clone is cheap; clones share the same jar.
#[derive(Debug, Clone)]
pub struct TokenStore {
    jar: Arc<CookieJar>,
    options: CookieOptions,
}

impl TokenStore {
    pub fn new(jar: Arc<CookieJar>, options: CookieOptions) -> Self {
        Self { jar, options }
    }

    /// Store backed by a process-local jar with default cookie attributes.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(CookieJar::in_memory()), CookieOptions::default())
    }

    /// Current access token, if one is stored and its cookie has not expired.
    pub fn get(&self) -> Option<String> {
        self.jar.get(TokenKind::AccessToken.cookie_name())
    }

    /// Save the access token, replacing any previous one.
    pub fn set(&self, token: &str) -> Result<()> {
        let days = self.options.expires_days;
        let expires_at = Duration::try_days(days)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .ok_or_else(|| anyhow!("Cookie expiry of {days} days is out of range"))?;
        let cookie = StoredCookie {
            value: token.to_string(),
            domain: self.options.domain.clone(),
            same_site: self.options.same_site,
            expires_at: Some(expires_at),
        };
        self.jar.set(TokenKind::AccessToken.cookie_name(), cookie)?;
        debug!(domain = %self.options.domain, "Access token saved");
        Ok(())
    }

    /// Delete the access token. No-op if there is none.
    pub fn remove(&self) -> Result<()> {
        self.jar.remove(TokenKind::AccessToken.cookie_name())?;
        debug!("Access token removed");
        Ok(())
    }

    pub fn jar(&self) -> &Arc<CookieJar> {
        &self.jar
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::cookies::SameSite;

    #[test]
    fn test_round_trip() {
        let store = TokenStore::in_memory();
        for token in ["abc123", "", "eyJhbGciOiJIUzI1NiJ9.e30.sig", "with spaces"] {
            store.set(token).unwrap();
            assert_eq!(store.get().as_deref(), Some(token));
        }
    }

    #[test]
    fn test_remove_is_idempotent() {
        let store = TokenStore::in_memory();
        store.set("abc123").unwrap();

        store.remove().unwrap();
        assert_eq!(store.get(), None);
        store.remove().unwrap();
        assert_eq!(store.get(), None);
    }

    #[test]
    fn test_cookie_attributes() {
        let store = TokenStore::in_memory();
        store.set("abc123").unwrap();

        let cookie = store.jar().entry("accessToken").unwrap();
        assert_eq!(cookie.domain, "localhost");
        assert_eq!(cookie.same_site, SameSite::Strict);

        let ttl = cookie.expires_at.unwrap() - Utc::now();
        assert!(ttl <= Duration::days(1));
        assert!(ttl > Duration::hours(23));
    }

    #[test]
    fn test_clones_share_jar() {
        let store = TokenStore::in_memory();
        let other = store.clone();
        store.set("shared").unwrap();
        assert_eq!(other.get().as_deref(), Some("shared"));
    }

    #[test]
    fn test_token_kind_names() {
        assert_eq!(TokenKind::AccessToken.cookie_name(), "accessToken");
        assert_eq!(TokenKind::RefreshToken.to_string(), "refreshToken");
    }

    #[test]
    fn test_out_of_range_expiry_is_an_error() {
        let options = CookieOptions {
            expires_days: i64::MAX,
            ..CookieOptions::default()
        };
        let store = TokenStore::new(Arc::new(CookieJar::in_memory()), options);

        assert!(store.set("abc123").is_err());
        assert_eq!(store.get(), None);
    }
}
