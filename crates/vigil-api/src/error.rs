//! API error types.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use vigil_db::DbError;
use vigil_perception::PerceptionError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No face detected")]
    NoFace,

    #[error("Capture cooldown, retry in {retry_after_ms} ms")]
    Cooldown { retry_after_ms: u64 },

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Store error: {0}")]
    Db(#[from] DbError),

    #[error("{0}")]
    Perception(#[from] PerceptionError),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Short machine-readable code sent next to the message.
    fn code(&self) -> Option<&'static str> {
        match self {
            ApiError::NoFace => Some("no_face"),
            ApiError::Cooldown { .. } => Some("cooldown"),
            ApiError::Perception(e) => Some(e.failure_code().as_str()),
            _ => None,
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::NoFace => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Cooldown { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Db(e) => db_status(e),
            ApiError::Perception(e) => match e {
                PerceptionError::NoFrame | PerceptionError::Camera(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                PerceptionError::NoFace => StatusCode::UNPROCESSABLE_ENTITY,
                PerceptionError::NoResults(_)
                | PerceptionError::InferenceFailed(_)
                | PerceptionError::InvalidResponse(_) => StatusCode::BAD_GATEWAY,
                PerceptionError::Db(e) => db_status(e),
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

fn db_status(e: &DbError) -> StatusCode {
    match e {
        DbError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        DbError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let detail = if status == StatusCode::INTERNAL_SERVER_ERROR
            && std::env::var("ENVIRONMENT")
                .map(|v| v.eq_ignore_ascii_case("production"))
                .unwrap_or(false)
        {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            detail,
            code: self.code().map(str::to_string),
        };
        let mut response = (status, Json(body)).into_response();

        if let ApiError::Cooldown { retry_after_ms } = self {
            let secs = retry_after_ms.div_ceil(1000).max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
