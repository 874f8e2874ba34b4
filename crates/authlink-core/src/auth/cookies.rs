use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use reqwest::cookie::CookieStore;
use reqwest::header::HeaderValue;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// SameSite cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl From<cookie::SameSite> for SameSite {
    fn from(value: cookie::SameSite) -> Self {
        match value {
            cookie::SameSite::Strict => SameSite::Strict,
            cookie::SameSite::Lax => SameSite::Lax,
            cookie::SameSite::None => SameSite::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub value: String,
    pub domain: String,
    pub same_site: SameSite,
    /// `None` for a session cookie, which lives as long as the jar does.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredCookie {
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }

    /// Whether this cookie should be sent to `host`.
    pub fn matches_host(&self, host: &str) -> bool {
        let domain = self.domain.trim_start_matches('.');
        host.eq_ignore_ascii_case(domain)
            || host
                .strip_suffix(domain)
                .is_some_and(|prefix| prefix.ends_with('.'))
    }

    /// Build a cookie from a `Set-Cookie` header received from `host`.
    ///
    /// `Max-Age` wins over `Expires`. A cookie without either is a session
    /// cookie. Returns the cookie name along with the record.
    fn from_set_cookie(raw: &str, host: &str) -> Option<(String, Self)> {
        let parsed = cookie::Cookie::parse(raw).ok()?;
        let expires_at = match (parsed.max_age(), parsed.expires_datetime()) {
            (Some(max_age), _) => Some(
                Duration::try_seconds(max_age.whole_seconds())
                    .and_then(|ttl| Utc::now().checked_add_signed(ttl))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            ),
            (None, Some(at)) => Some(
                DateTime::from_timestamp(at.unix_timestamp(), 0)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            ),
            (None, None) => None,
        };
        let cookie = Self {
            value: parsed.value().to_string(),
            domain: parsed.domain().unwrap_or(host).to_string(),
            same_site: parsed.same_site().map(SameSite::from).unwrap_or(SameSite::Lax),
            expires_at,
        };
        Some((parsed.name().to_string(), cookie))
    }
}

/// Named cookie storage with browser-like expiry.
///
/// Expired cookies read as absent and are dropped on the next access. When a
/// file path is attached, every mutation is written through to disk so the
/// jar survives restarts.
///
/// The jar also serves as reqwest's cookie provider, so cookies the server
/// sets (the refresh token) are persisted next to the access token. Cookies
/// are keyed by name only.
#[derive(Debug)]
pub struct CookieJar {
    path: Option<PathBuf>,
    cookies: RwLock<HashMap<String, StoredCookie>>,
}

impl CookieJar {
    /// A jar that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            cookies: RwLock::new(HashMap::new()),
        }
    }

    /// Open a jar persisted at `path`, loading existing cookies if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut cookies: HashMap<String, StoredCookie> = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read cookie file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse cookie file {}", path.display()))?
        } else {
            HashMap::new()
        };
        cookies.retain(|_, cookie| !cookie.is_expired());
        debug!(path = %path.display(), count = cookies.len(), "Cookie jar loaded");

        Ok(Self {
            path: Some(path),
            cookies: RwLock::new(cookies),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Value of a live cookie, or `None` if absent or expired.
    pub fn get(&self, name: &str) -> Option<String> {
        {
            let cookies = self.cookies.read().unwrap_or_else(|e| e.into_inner());
            match cookies.get(name) {
                Some(cookie) if !cookie.is_expired() => return Some(cookie.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: prune it. Write-through is best effort here since this is a read path.
        let mut cookies = self.cookies.write().unwrap_or_else(|e| e.into_inner());
        if cookies.get(name).is_some_and(StoredCookie::is_expired) {
            cookies.remove(name);
            debug!(name, "Dropped expired cookie");
            if let Err(e) = self.persist(&cookies) {
                warn!(error = %e, "Failed to persist cookie jar");
            }
        }
        None
    }

    /// Full cookie record, including expired ones that have not been pruned yet.
    pub fn entry(&self, name: &str) -> Option<StoredCookie> {
        let cookies = self.cookies.read().unwrap_or_else(|e| e.into_inner());
        cookies.get(name).cloned()
    }

    /// Insert or replace a cookie.
    pub fn set(&self, name: &str, cookie: StoredCookie) -> Result<()> {
        let mut cookies = self.cookies.write().unwrap_or_else(|e| e.into_inner());
        cookies.insert(name.to_string(), cookie);
        self.persist(&cookies)
    }

    /// Remove a cookie. Removing an absent cookie is not an error.
    pub fn remove(&self, name: &str) -> Result<()> {
        let mut cookies = self.cookies.write().unwrap_or_else(|e| e.into_inner());
        if cookies.remove(name).is_some() {
            self.persist(&cookies)?;
        }
        Ok(())
    }

    fn persist(&self, cookies: &HashMap<String, StoredCookie>) -> Result<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create cookie directory {}", parent.display())
            })?;
        }
        let contents = serde_json::to_string_pretty(cookies)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write cookie file {}", path.display()))?;
        Ok(())
    }
}

impl CookieStore for CookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let host = url.host_str().unwrap_or_default();
        for header in cookie_headers {
            let Some((name, cookie)) = header
                .to_str()
                .ok()
                .and_then(|raw| StoredCookie::from_set_cookie(raw, host))
            else {
                warn!(url = %url, "Ignoring malformed Set-Cookie header");
                continue;
            };

            let result = if cookie.is_expired() {
                self.remove(&name)
            } else {
                self.set(&name, cookie)
            };
            match result {
                Ok(()) => debug!(name = %name, host, "Stored server cookie"),
                Err(e) => warn!(error = %e, name = %name, "Failed to persist server cookie"),
            }
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let host = url.host_str()?;
        let cookies = self.cookies.read().unwrap_or_else(|e| e.into_inner());
        let mut pairs: Vec<String> = cookies
            .iter()
            .filter(|(_, cookie)| !cookie.is_expired() && cookie.matches_host(host))
            .map(|(name, cookie)| format!("{}={}", name, cookie.value))
            .collect();
        if pairs.is_empty() {
            return None;
        }
        pairs.sort();
        HeaderValue::from_str(&pairs.join("; ")).ok()
    }
}
