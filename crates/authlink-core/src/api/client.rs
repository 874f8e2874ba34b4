//! HTTP client with optional bearer-token interceptors.
//!
//! `ApiClients` builds the two instances the rest of an application talks
//! to: `classic`, which sends requests untouched, and `with_auth`, which
//! attaches the stored access token and refreshes it once on auth failures.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Client, Response};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::auth::{AuthService, CookieJar, TokenRefresher, TokenStore};
use crate::config::ClientConfig;

use super::interceptor::{AuthInterceptor, Recovery};
use super::{ApiError, ApiRequest};

/// API client bound to one base endpoint.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    config: Arc<ClientConfig>,
    auth: Option<Arc<AuthInterceptor>>,
}

impl ApiClient {
    /// Create a client without interceptors. Server cookies are kept in a
    /// process-local jar.
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        Self::with_cookie_jar(config, Arc::new(CookieJar::in_memory()))
    }

    /// Create a client without interceptors whose server cookies are stored
    /// in `jar`. The jar is only used when `with_credentials` is on.
    pub fn with_cookie_jar(config: ClientConfig, jar: Arc<CookieJar>) -> Result<Self, ApiError> {
        let client = Self::build_http_client(&config, jar)?;
        Ok(Self {
            client,
            config: Arc::new(config),
            auth: None,
        })
    }

    fn build_http_client(config: &ClientConfig, jar: Arc<CookieJar>) -> Result<Client, ApiError> {
        let content_type = header::HeaderValue::from_str(&config.content_type).map_err(|e| {
            ApiError::InvalidRequest(format!(
                "Invalid content type {:?}: {}",
                config.content_type, e
            ))
        })?;
        let mut default_headers = header::HeaderMap::new();
        default_headers.insert(header::CONTENT_TYPE, content_type);

        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(default_headers);
        if config.with_credentials {
            builder = builder.cookie_provider(jar);
        }
        Ok(builder.build()?)
    }

    /// Create a client with the auth interceptors installed, sharing this
    /// client's connection pool and cookie store.
    pub fn with_auth(&self, store: TokenStore, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            client: self.client.clone(),
            config: Arc::clone(&self.config),
            auth: Some(Arc::new(AuthInterceptor::new(store, refresher))),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Token store used by the interceptors, if this is an authenticated client.
    pub fn token_store(&self) -> Option<&TokenStore> {
        self.auth.as_ref().map(|auth| auth.store())
    }

    /// Send a request, returning the response if it succeeded.
    ///
    /// On the authenticated client an auth failure triggers a token refresh
    /// and a single resend; whatever that resend returns is the result.
    pub async fn send(&self, request: &ApiRequest) -> Result<Response, ApiError> {
        let mut retries = 0;

        loop {
            let error = match self.send_once(request).await {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };

            let Some(ref auth) = self.auth else {
                return Err(error);
            };

            match auth.on_error(&error, retries).await {
                Recovery::Retry => {
                    retries += 1;
                    debug!(
                        path = request.path(),
                        retry = retries,
                        "Resending request with refreshed token"
                    );
                }
                Recovery::Propagate => return Err(error),
            }
        }
    }

    async fn send_once(&self, request: &ApiRequest) -> Result<Response, ApiError> {
        let url = self.config.endpoint(request.path());

        let mut headers = request.headers().clone();
        if let Some(ref auth) = self.auth {
            auth.on_request(&mut headers);
        }

        let mut builder = self
            .client
            .request(request.method().clone(), &url)
            .headers(headers);
        if !request.query_pairs().is_empty() {
            builder = builder.query(request.query_pairs());
        }
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        debug!(method = %request.method(), url = %url, "Sending request");
        let response = builder.send().await?;
        debug!(status = %response.status(), url = %url, "Got response");

        Self::check_response(response).await
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Send a request and decode its JSON body. An empty body decodes as `null`.
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
    ) -> Result<T, ApiError> {
        let response = self.send(request).await?;
        let bytes = response.bytes().await?;
        let payload: &[u8] = if bytes.is_empty() { b"null" } else { &bytes };
        serde_json::from_slice(payload).map_err(|e| {
            ApiError::InvalidResponse(format!(
                "Failed to parse JSON response from {}: {}",
                request.path(),
                e
            ))
        })
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.fetch_json(&ApiRequest::get(path)).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.fetch_json(&ApiRequest::post(path).json(body)?).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.fetch_json(&ApiRequest::put(path).json(body)?).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.fetch_json(&ApiRequest::patch(path).json(body)?).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.fetch_json(&ApiRequest::delete(path)).await
    }
}

/// The unauthenticated and authenticated clients, built from one config.
#[derive(Clone)]
pub struct ApiClients {
    pub classic: ApiClient,
    pub with_auth: ApiClient,
    store: TokenStore,
}

impl ApiClients {
    /// Build both clients, refreshing tokens through the HTTP `AuthService`.
    ///
    /// Server cookies share the token store's jar, so a persisted jar keeps
    /// the refresh token across restarts too.
    pub fn new(config: ClientConfig, store: TokenStore) -> Result<Self, ApiError> {
        let classic = ApiClient::with_cookie_jar(config, Arc::clone(store.jar()))?;
        let refresher = Arc::new(AuthService::new(classic.clone(), store.clone()));
        let with_auth = classic.with_auth(store.clone(), refresher);
        Ok(Self {
            classic,
            with_auth,
            store,
        })
    }

    /// Build both clients with a caller-supplied refresher.
    pub fn with_refresher(
        config: ClientConfig,
        store: TokenStore,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Result<Self, ApiError> {
        let classic = ApiClient::with_cookie_jar(config, Arc::clone(store.jar()))?;
        let with_auth = classic.with_auth(store.clone(), refresher);
        Ok(Self {
            classic,
            with_auth,
            store,
        })
    }

    /// Auth endpoints (login, logout, refresh) over the classic client.
    pub fn auth_service(&self) -> AuthService {
        AuthService::new(self.classic.clone(), self.store.clone())
    }

    pub fn token_store(&self) -> &TokenStore {
        &self.store
    }
}
