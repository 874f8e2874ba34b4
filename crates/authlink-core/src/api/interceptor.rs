//! Bearer-token interceptors for the authenticated client.
//!
//! The request side stamps `Authorization: Bearer <token>` on every outgoing
//! request when a token is stored. The response side decides, for a failed
//! request, whether a token refresh followed by one resend is worth trying.

use std::sync::Arc;

use reqwest::header::{self, HeaderMap, HeaderValue};
use tracing::{debug, info, warn};

use crate::auth::{RefreshError, SingleFlightRefresh, TokenRefresher, TokenStore};

use super::ApiError;

/// Maximum number of resends after a token refresh, per logical request.
pub const MAX_AUTH_RETRIES: u32 = 1;

/// What the client should do with a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// A fresh token is in the store; send the request again.
    Retry,
    /// Give the original error back to the caller.
    Propagate,
}

pub struct AuthInterceptor {
    store: TokenStore,
    refresh: SingleFlightRefresh,
}

impl AuthInterceptor {
    pub fn new(store: TokenStore, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            store,
            refresh: SingleFlightRefresh::new(refresher),
        }
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Request interceptor: add the bearer header if a token is stored.
    ///
    /// Never fails; a missing or unusable token leaves the headers untouched.
    pub fn on_request(&self, headers: &mut HeaderMap) {
        let Some(token) = self.store.get() else {
            return;
        };
        match HeaderValue::from_str(&format!("Bearer {}", token)) {
            Ok(mut value) => {
                value.set_sensitive(true);
                headers.insert(header::AUTHORIZATION, value);
            }
            Err(e) => {
                warn!(error = %e, "Stored access token is not a valid header value");
            }
        }
    }

    /// Response interceptor: decide how to handle a failed request.
    ///
    /// `retries` is how many times this logical request has already been
    /// resent. Refresh failures are logged and swallowed so the caller sees
    /// the original error; an expired refresh credential also clears the
    /// stored access token.
    pub async fn on_error(&self, error: &ApiError, retries: u32) -> Recovery {
        let Some(failure) = error.auth_failure() else {
            return Recovery::Propagate;
        };
        if retries >= MAX_AUTH_RETRIES {
            debug!(?failure, retries, "Auth failure on retried request, giving up");
            return Recovery::Propagate;
        }

        debug!(?failure, "Auth failure, refreshing token");
        match self.refresh.refresh().await {
            Ok(()) => {
                info!("Token refreshed, retrying request");
                Recovery::Retry
            }
            Err(RefreshError::Expired) => {
                warn!("Refresh token expired, clearing stored access token");
                if let Err(e) = self.store.remove() {
                    warn!(error = %e, "Failed to remove access token");
                }
                Recovery::Propagate
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                Recovery::Propagate
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use reqwest::StatusCode;

    struct StubRefresher {
        calls: AtomicUsize,
        store: TokenStore,
        outcome: Result<&'static str, RefreshError>,
    }

    #[async_trait]
    impl TokenRefresher for StubRefresher {
        async fn get_new_tokens(&self) -> Result<(), RefreshError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let token = self.outcome.clone()?;
            self.store.set(token).map_err(|e| RefreshError::Failed(e.to_string()))
        }
    }

    fn setup(
        outcome: Result<&'static str, RefreshError>,
    ) -> (AuthInterceptor, Arc<StubRefresher>) {
        let store = TokenStore::in_memory();
        let refresher = Arc::new(StubRefresher {
            calls: AtomicUsize::new(0),
            store: store.clone(),
            outcome,
        });
        (AuthInterceptor::new(store, refresher.clone()), refresher)
    }

    fn unauthorized() -> ApiError {
        ApiError::from_status(StatusCode::UNAUTHORIZED, "")
    }

    #[test]
    fn test_on_request_adds_bearer_header() {
        let (interceptor, _) = setup(Ok("unused"));
        interceptor.store().set("abc123").unwrap();

        let mut headers = HeaderMap::new();
        interceptor.on_request(&mut headers);
        assert_eq!(headers[header::AUTHORIZATION], "Bearer abc123");
    }

    #[test]
    fn test_on_request_without_token_leaves_headers() {
        let (interceptor, _) = setup(Ok("unused"));

        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));
        interceptor.on_request(&mut headers);
        assert!(headers.get(header::AUTHORIZATION).is_none());
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_on_request_skips_invalid_token() {
        let (interceptor, _) = setup(Ok("unused"));
        interceptor.store().set("bad\ntoken").unwrap();

        let mut headers = HeaderMap::new();
        interceptor.on_request(&mut headers);
        assert!(headers.get(header::AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn test_auth_failure_refreshes_and_retries() {
        let (interceptor, refresher) = setup(Ok("xyz789"));
        interceptor.store().set("abc123").unwrap();

        assert_eq!(interceptor.on_error(&unauthorized(), 0).await, Recovery::Retry);
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(interceptor.store().get().as_deref(), Some("xyz789"));
    }

    #[tokio::test]
    async fn test_already_retried_does_not_refresh() {
        let (interceptor, refresher) = setup(Ok("xyz789"));

        assert_eq!(interceptor.on_error(&unauthorized(), 1).await, Recovery::Propagate);
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_non_auth_error_propagates() {
        let (interceptor, refresher) = setup(Ok("xyz789"));
        let error = ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, "boom");

        assert_eq!(interceptor.on_error(&error, 0).await, Recovery::Propagate);
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_message_based_failures_trigger_refresh() {
        for body in [r#"{"message":"jwt expired"}"#, r#"{"message":"jwt must be provided"}"#] {
            let (interceptor, refresher) = setup(Ok("xyz789"));
            let error = ApiError::from_status(StatusCode::BAD_REQUEST, body);

            assert_eq!(interceptor.on_error(&error, 0).await, Recovery::Retry);
            assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn test_expired_refresh_clears_token() {
        let (interceptor, _) = setup(Err(RefreshError::Expired));
        interceptor.store().set("abc123").unwrap();

        assert_eq!(interceptor.on_error(&unauthorized(), 0).await, Recovery::Propagate);
        assert_eq!(interceptor.store().get(), None);
    }

    #[tokio::test]
    async fn test_other_refresh_failure_keeps_token() {
        let (interceptor, _) =
            setup(Err(RefreshError::Rejected("Invalid refresh token".to_string())));
        interceptor.store().set("abc123").unwrap();

        assert_eq!(interceptor.on_error(&unauthorized(), 0).await, Recovery::Propagate);
        assert_eq!(interceptor.store().get().as_deref(), Some("abc123"));
    }
}
