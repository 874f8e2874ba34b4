use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::{ApiClient, ApiError};

use super::refresh::{RefreshError, TokenRefresher};
use super::TokenStore;

const LOGIN_PATH: &str = "auth/login";
const REGISTER_PATH: &str = "auth/register";
const REFRESH_PATH: &str = "auth/login/access-token";
const LOGOUT_PATH: &str = "auth/logout";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Login,
    Register,
}

impl AuthMode {
    fn path(self) -> &'static str {
        match self {
            AuthMode::Login => LOGIN_PATH,
            AuthMode::Register => REGISTER_PATH,
        }
    }
}

#[derive(Debug, Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

/// Successful login, registration or refresh.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(default)]
    pub user: Option<serde_json::Value>,
}

/// Auth endpoints of the API, called over the unauthenticated client.
///
/// Every successful call stores the returned access token; the refresh
/// token travels as a server-set cookie in the client's cookie store.
#[derive(Clone)]
pub struct AuthService {
    client: ApiClient,
    store: TokenStore,
}

impl AuthService {
    pub fn new(client: ApiClient, store: TokenStore) -> Self {
        Self { client, store }
    }

    pub fn token_store(&self) -> &TokenStore {
        &self.store
    }

    /// Log in or register, then save the issued access token.
    pub async fn authenticate(
        &self,
        mode: AuthMode,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse, ApiError> {
        let response: AuthResponse = self
            .client
            .post(mode.path(), &Credentials { email, password })
            .await?;
        self.save(&response)?;
        info!(?mode, "Authenticated");
        Ok(response)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
        self.authenticate(AuthMode::Login, email, password).await
    }

    pub async fn register(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
        self.authenticate(AuthMode::Register, email, password).await
    }

    /// Exchange the refresh-token cookie for a new access token and save it.
    pub async fn refresh(&self) -> Result<AuthResponse, ApiError> {
        let response: AuthResponse = self
            .client
            .post(REFRESH_PATH, &serde_json::json!({}))
            .await?;
        self.save(&response)?;
        Ok(response)
    }

    /// Tell the server to end the session and forget the local token.
    ///
    /// The local token is removed even when the server call fails.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let result = self
            .client
            .post::<serde_json::Value, _>(LOGOUT_PATH, &serde_json::json!({}))
            .await;
        if let Err(e) = self.store.remove() {
            warn!(error = %e, "Failed to remove access token");
        }
        result.map(|_| ())
    }

    fn save(&self, response: &AuthResponse) -> Result<(), ApiError> {
        if response.access_token.is_empty() {
            return Err(ApiError::InvalidResponse(
                "Auth response contained an empty access token".to_string(),
            ));
        }
        self.store
            .set(&response.access_token)
            .map_err(|e| ApiError::Storage(format!("{e:#}")))
    }
}

#[async_trait]
impl TokenRefresher for AuthService {
    async fn get_new_tokens(&self) -> Result<(), RefreshError> {
        self.refresh().await.map(|_| ()).map_err(RefreshError::from)
    }
}
