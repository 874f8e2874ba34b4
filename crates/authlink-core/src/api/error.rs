use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Request rejected ({status}): {message}")]
    ClientError { status: StatusCode, message: String },

    #[error("Server error ({status}): {message}")]
    ServerError { status: StatusCode, message: String },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Token storage error: {0}")]
    Storage(String),
}

/// Why a request was rejected for authentication reasons.
///
/// Servers signal this either with a 401 or with a well-known message on
/// some other status; both are folded into this enum once, when the error is
/// classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    Unauthorized,
    TokenExpired,
    TokenMissing,
}

const JWT_EXPIRED: &str = "jwt expired";
const JWT_MISSING: &str = "jwt must be provided";

impl AuthFailure {
    pub fn from_message(message: &str) -> Option<Self> {
        match message {
            JWT_EXPIRED => Some(AuthFailure::TokenExpired),
            JWT_MISSING => Some(AuthFailure::TokenMissing),
            _ => None,
        }
    }
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error payload shape used by the API: `{"message": "..."}` or
/// `{"message": ["...", ...]}` for validation errors.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<ErrorMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorMessage {
    One(String),
    Many(Vec<String>),
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Pull the human-readable message out of an error response body.
    ///
    /// Prefers the JSON `message` field (first entry if it is a list), falls
    /// back to the raw body, then to the status reason phrase.
    pub fn extract_message(status: StatusCode, body: &str) -> String {
        if let Ok(ErrorBody { message: Some(message) }) = serde_json::from_str::<ErrorBody>(body) {
            match message {
                ErrorMessage::One(text) => return text,
                ErrorMessage::Many(list) => {
                    if let Some(first) = list.into_iter().next() {
                        return first;
                    }
                }
            }
        }

        let trimmed = body.trim();
        if trimmed.is_empty() {
            status.canonical_reason().unwrap_or("Unknown error").to_string()
        } else {
            Self::truncate_body(trimmed)
        }
    }

    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = Self::extract_message(status, body);
        match status.as_u16() {
            401 => ApiError::Unauthorized(message),
            403 => ApiError::AccessDenied(message),
            404 => ApiError::NotFound(message),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError { status, message },
            _ => ApiError::ClientError { status, message },
        }
    }

    /// HTTP status of the failed response, if the server answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::AccessDenied(_) => Some(StatusCode::FORBIDDEN),
            ApiError::Unauthorized(_) => Some(StatusCode::UNAUTHORIZED),
            ApiError::NotFound(_) => Some(StatusCode::NOT_FOUND),
            ApiError::RateLimited => Some(StatusCode::TOO_MANY_REQUESTS),
            ApiError::ClientError { status, .. } | ApiError::ServerError { status, .. } => {
                Some(*status)
            }
            ApiError::NetworkError(e) => e.status(),
            ApiError::InvalidResponse(_) | ApiError::InvalidRequest(_) | ApiError::Storage(_) => {
                None
            }
        }
    }

    /// Normalized message for this error: the server's message for HTTP
    /// failures, the error text otherwise.
    pub fn message(&self) -> String {
        match self {
            ApiError::AccessDenied(message)
            | ApiError::Unauthorized(message)
            | ApiError::NotFound(message)
            | ApiError::ClientError { message, .. }
            | ApiError::ServerError { message, .. } => message.clone(),
            ApiError::InvalidResponse(message)
            | ApiError::InvalidRequest(message)
            | ApiError::Storage(message) => message.clone(),
            ApiError::RateLimited | ApiError::NetworkError(_) => self.to_string(),
        }
    }

    /// Classify this error as an authentication failure, if it is one.
    pub fn auth_failure(&self) -> Option<AuthFailure> {
        if matches!(self, ApiError::Unauthorized(_)) {
            return Some(AuthFailure::Unauthorized);
        }
        AuthFailure::from_message(&self.message())
    }
}
