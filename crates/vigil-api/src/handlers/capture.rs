//! Manual capture.

use axum::extract::State;
use axum::Json;
use vigil_models::FailureCode;
use vigil_perception::{CaptureOutcome, CaptureReason};

use super::blocking;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Capture the annotated frame now, subject to the shared cooldown.
///
/// Uploaded and retained captures both answer 200; the body says which.
pub async fn capture(State(state): State<AppState>) -> ApiResult<Json<CaptureOutcome>> {
    let gate = state.capture.clone();
    let outcome = blocking(move || Ok(gate.request_capture(CaptureReason::Manual))).await?;

    match outcome {
        CaptureOutcome::Cooldown { retry_after_ms, .. } => Err(ApiError::Cooldown { retry_after_ms }),
        CaptureOutcome::Failed {
            code: FailureCode::NoFrame,
            ..
        } => Err(ApiError::unavailable("camera_unavailable")),
        CaptureOutcome::Failed { error, .. } => Err(ApiError::internal(error)),
        outcome => Ok(Json(outcome)),
    }
}
