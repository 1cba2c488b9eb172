//! Perception error types.

use thiserror::Error;
use vigil_models::FailureCode;

pub type PerceptionResult<T> = Result<T, PerceptionError>;

#[derive(Debug, Error)]
pub enum PerceptionError {
    #[error("Camera error: {0}")]
    Camera(String),

    #[error("Microphone error: {0}")]
    Microphone(String),

    #[error("No frame available")]
    NoFrame,

    #[error("No face detected")]
    NoFace,

    #[error("No results: {0}")]
    NoResults(String),

    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Encoding failed: {0}")]
    EncodeFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Store error: {0}")]
    Db(#[from] vigil_db::DbError),

    #[error("Storage error: {0}")]
    Storage(#[from] vigil_storage::StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PerceptionError {
    pub fn camera(msg: impl Into<String>) -> Self {
        Self::Camera(msg.into())
    }

    pub fn microphone(msg: impl Into<String>) -> Self {
        Self::Microphone(msg.into())
    }

    pub fn inference_failed(msg: impl Into<String>) -> Self {
        Self::InferenceFailed(msg.into())
    }

    pub fn encode_failed(msg: impl Into<String>) -> Self {
        Self::EncodeFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Failure code published in a worker's result slot.
    pub fn failure_code(&self) -> FailureCode {
        match self {
            PerceptionError::NoFrame | PerceptionError::Camera(_) => FailureCode::NoFrame,
            PerceptionError::NoFace => FailureCode::NoFace,
            PerceptionError::NoResults(_) => FailureCode::NoResults,
            PerceptionError::InvalidResponse(_) => FailureCode::InvalidResponse,
            PerceptionError::EncodeFailed(_) => FailureCode::EncodeFailed,
            PerceptionError::Db(_) | PerceptionError::Io(_) => FailureCode::StoreFailed,
            PerceptionError::InferenceFailed(_)
            | PerceptionError::Microphone(_)
            | PerceptionError::ConfigError(_)
            | PerceptionError::Storage(_) => FailureCode::InferenceFailed,
        }
    }
}

impl From<vigil_ml_client::MlClientError> for PerceptionError {
    fn from(e: vigil_ml_client::MlClientError) -> Self {
        if e.is_invalid_response() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::InferenceFailed(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_ml_client::MlClientError;

    #[test]
    fn test_ml_errors_split_by_kind() {
        let bad: PerceptionError = MlClientError::invalid_response("not json").into();
        assert_eq!(bad.failure_code(), FailureCode::InvalidResponse);

        let down: PerceptionError = MlClientError::Status {
            status: 502,
            body: String::new(),
        }
        .into();
        assert_eq!(down.failure_code(), FailureCode::InferenceFailed);
    }

    #[test]
    fn test_store_errors_map_to_store_failed() {
        let err: PerceptionError = vigil_db::DbError::invalid_input("empty").into();
        assert_eq!(err.failure_code(), FailureCode::StoreFailed);
    }
}
