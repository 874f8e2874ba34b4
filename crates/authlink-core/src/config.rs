//! Client configuration management.
//!
//! This module holds everything the two HTTP client instances share: the base
//! endpoint, default headers, whether cookies travel with requests, and the
//! attributes used when the access token is written to the cookie jar.
//!
//! Configuration is layered: built-in defaults, then an optional JSON file
//! (`~/.config/authlink/config.json`), then `AUTHLINK_*` environment variables.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::cookies::SameSite;

/// Application name used for config/data directory paths
const APP_NAME: &str = "authlink";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Cookie jar file name in the data directory
const COOKIE_FILE: &str = "cookies.json";

const DEFAULT_BASE_URL: &str = "http://localhost:4200/api";

/// Default `Content-Type` header. Requests with a JSON body still go out as
/// `application/json`; reqwest only falls back to this value when the
/// request sets no content type of its own.
const DEFAULT_CONTENT_TYPE: &str = "application.json";

/// HTTP request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

const DEFAULT_COOKIE_DOMAIN: &str = "localhost";

/// Lifetime of the access token cookie.
const DEFAULT_COOKIE_EXPIRES_DAYS: i64 = 1;

/// Browsers cap cookie lifetimes at 400 days.
const MAX_COOKIE_EXPIRES_DAYS: i64 = 400;

const ENV_API_URL: &str = "AUTHLINK_API_URL";
const ENV_CONTENT_TYPE: &str = "AUTHLINK_CONTENT_TYPE";
const ENV_WITH_CREDENTIALS: &str = "AUTHLINK_WITH_CREDENTIALS";
const ENV_TIMEOUT_SECS: &str = "AUTHLINK_TIMEOUT_SECS";
const ENV_COOKIE_DOMAIN: &str = "AUTHLINK_COOKIE_DOMAIN";
const ENV_COOKIE_FILE: &str = "AUTHLINK_COOKIE_FILE";

/// Attributes applied to the access token cookie on every write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieOptions {
    pub domain: String,
    pub same_site: SameSite,
    pub expires_days: i64,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            domain: DEFAULT_COOKIE_DOMAIN.to_string(),
            same_site: SameSite::Strict,
            expires_days: DEFAULT_COOKIE_EXPIRES_DAYS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub content_type: String,
    /// Keep a cookie store shared by both clients so server-set cookies
    /// (the refresh token) are sent back on later requests.
    pub with_credentials: bool,
    pub timeout_secs: u64,
    pub cookie: CookieOptions,
    /// Where the token cookie jar is persisted. `None` keeps it in memory.
    pub cookie_file: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            with_credentials: true,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            cookie: CookieOptions::default(),
            cookie_file: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from the default file location (if present) and
    /// apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = Self::from_file_or_default(&path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit file and apply environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn from_file_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Override fields from `AUTHLINK_*` variables.
    ///
    /// The lookup is injected so tests do not have to touch the process
    /// environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL) {
            self.base_url = url;
        }
        if let Some(content_type) = lookup(ENV_CONTENT_TYPE) {
            self.content_type = content_type;
        }
        if let Some(raw) = lookup(ENV_WITH_CREDENTIALS) {
            self.with_credentials = parse_bool(&raw)
                .with_context(|| format!("Invalid {ENV_WITH_CREDENTIALS} value: {raw}"))?;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            self.timeout_secs = raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("Invalid {ENV_TIMEOUT_SECS} value: {raw}"))?;
        }
        if let Some(domain) = lookup(ENV_COOKIE_DOMAIN) {
            self.cookie.domain = domain;
        }
        if let Some(path) = lookup(ENV_COOKIE_FILE) {
            self.cookie_file = Some(PathBuf::from(path));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        reqwest::Url::parse(&self.base_url)
            .with_context(|| format!("Invalid base URL: {}", self.base_url))?;
        if self.timeout_secs == 0 {
            bail!("Request timeout must be greater than zero");
        }
        if self.cookie.expires_days <= 0 {
            bail!("Cookie expiry must be at least one day");
        }
        if self.cookie.expires_days > MAX_COOKIE_EXPIRES_DAYS {
            bail!(
                "Cookie expiry must be at most {MAX_COOKIE_EXPIRES_DAYS} days, got {}",
                self.cookie.expires_days
            );
        }
        Ok(())
    }

    /// Join a request path onto the base endpoint.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Default location of the persisted cookie jar.
    pub fn default_cookie_file() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME).join(COOKIE_FILE))
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got {other:?}"),
    }
}
