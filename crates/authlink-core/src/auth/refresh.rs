//! Token refresh seam and the single-flight guard around it.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use thiserror::Error;
use tracing::debug;

use crate::api::{ApiError, AuthFailure};

/// Failure to obtain a new access token.
///
/// Clone so one outcome can be handed to every caller waiting on the same
/// in-flight refresh.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// The refresh credential itself has expired; the user must log in again.
    #[error("Refresh token expired")]
    Expired,

    #[error("Token refresh rejected: {0}")]
    Rejected(String),

    #[error("Token refresh failed: {0}")]
    Failed(String),
}

impl From<ApiError> for RefreshError {
    fn from(err: ApiError) -> Self {
        if AuthFailure::from_message(&err.message()) == Some(AuthFailure::TokenExpired) {
            return RefreshError::Expired;
        }
        match err.status() {
            Some(_) => RefreshError::Rejected(err.message()),
            None => RefreshError::Failed(err.to_string()),
        }
    }
}

/// Something that can obtain a fresh access token and persist it.
#[async_trait]
pub trait TokenRefresher: Send + Sync + 'static {
    async fn get_new_tokens(&self) -> Result<(), RefreshError>;
}

type RefreshFuture = Shared<BoxFuture<'static, Result<(), RefreshError>>>;

/// Collapses concurrent refreshes into one call to the underlying refresher.
///
/// Callers arriving while a refresh is running await that same refresh and
/// see its result. Once it settles, the next caller starts a new one.
pub struct SingleFlightRefresh {
    refresher: Arc<dyn TokenRefresher>,
    in_flight: Mutex<Option<RefreshFuture>>,
}

impl SingleFlightRefresh {
    pub fn new(refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            refresher,
            in_flight: Mutex::new(None),
        }
    }

    pub async fn refresh(&self) -> Result<(), RefreshError> {
        let (future, leader) = {
            let mut slot = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            match slot.as_ref() {
                Some(existing) => (existing.clone(), false),
                None => {
                    let refresher = Arc::clone(&self.refresher);
                    let future = async move { refresher.get_new_tokens().await }
                        .boxed()
                        .shared();
                    *slot = Some(future.clone());
                    (future, true)
                }
            }
        };

        if !leader {
            debug!("Joining in-flight token refresh");
        }

        let result = future.clone().await;

        let mut slot = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().is_some_and(|current| current.ptr_eq(&future)) {
            *slot = None;
        }

        result
    }
}
