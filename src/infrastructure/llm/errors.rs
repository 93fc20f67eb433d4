use reqwest::StatusCode;
use thiserror::Error;

use crate::domain::errors::DomainError;

/// Errors that can occur when calling a text-generation provider
#[derive(Error, Debug)]
pub enum LlmApiError {
    /// Invalid request parameters (HTTP 400, 422)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid or missing API key (HTTP 401, 403)
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Unknown model or endpoint (HTTP 404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Rate limit exceeded (HTTP 429)
    #[error("Rate limit exceeded - too many requests")]
    RateLimitExceeded,

    /// Server error from the provider (HTTP 5xx)
    #[error("Server error ({0}): {1}")]
    ServerError(StatusCode, String),

    /// Provider is overloaded (HTTP 529)
    #[error("Provider overloaded")]
    Overloaded,

    /// Network or connection error
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// The provider answered without any text
    #[error("Provider returned an empty response")]
    EmptyResponse,

    /// Unknown or unexpected error
    #[error("Unknown error ({0}): {1}")]
    UnknownError(StatusCode, String),
}

impl LlmApiError {
    /// Returns true if this error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmApiError::RateLimitExceeded
                | LlmApiError::ServerError(_, _)
                | LlmApiError::Overloaded
                | LlmApiError::Timeout
                | LlmApiError::NetworkError(_)
        )
    }

    /// Map an HTTP status and body to an error variant
    pub fn from_status(status: StatusCode, body: String) -> Self {
        match status.as_u16() {
            400 | 422 => LlmApiError::InvalidRequest(body),
            401 | 403 => LlmApiError::AuthenticationFailed(body),
            404 => LlmApiError::NotFound(body),
            429 => LlmApiError::RateLimitExceeded,
            529 => LlmApiError::Overloaded,
            500..=599 => LlmApiError::ServerError(status, body),
            _ => LlmApiError::UnknownError(status, body),
        }
    }

    /// Classify a transport error, separating timeouts from other failures
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmApiError::Timeout
        } else {
            LlmApiError::NetworkError(err)
        }
    }
}

impl From<LlmApiError> for DomainError {
    fn from(err: LlmApiError) -> Self {
        DomainError::GenerationFailed(err.to_string())
    }
}
