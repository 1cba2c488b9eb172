//! ML client error types.

use thiserror::Error;

/// Result type for ML client operations.
pub type MlClientResult<T> = Result<T, MlClientError>;

/// Errors that can occur while calling an inference service.
#[derive(Debug, Error)]
pub enum MlClientError {
    #[error("Client not configured: {0}")]
    NotConfigured(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MlClientError {
    pub fn not_configured(msg: impl Into<String>) -> Self {
        Self::NotConfigured(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// True when the service answered but with something unusable.
    pub fn is_invalid_response(&self) -> bool {
        matches!(self, MlClientError::InvalidResponse(_) | MlClientError::Json(_))
    }
}
