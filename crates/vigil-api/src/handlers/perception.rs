//! Detections, on-demand emotion and the remaining last-result slots.

use axum::extract::{Query, State};
use axum::Json;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use vigil_models::Detection;
use vigil_perception::workers::emotion::classify_emotion;
use vigil_perception::{AudioTick, LabelTick};

use super::faces::{LastResponse, SourceQuery};
use super::{blocking, load_image};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Serialize)]
pub struct DetectionsResponse {
    pub timestamp: Option<DateTime<Utc>>,
    pub objects: Vec<Detection>,
}

/// Detections from the most recent published frame.
pub async fn detections(State(state): State<AppState>) -> Json<DetectionsResponse> {
    let (objects, timestamp) = match state.frames.detections() {
        Some((objects, at)) => (objects, Some(at)),
        None => (Vec::new(), None),
    };
    Json(DetectionsResponse { timestamp, objects })
}

/// Classify the emotion in an uploaded image or the live frame.
pub async fn emotion(
    State(state): State<AppState>,
    Query(query): Query<SourceQuery>,
    body: Bytes,
) -> ApiResult<Json<LabelTick>> {
    let Some(classifier) = state.emotion.clone() else {
        return Err(ApiError::unavailable("emotion classifier not configured"));
    };
    let frame = load_image(&state, query.source, &body)?;
    blocking(move || Ok(Json(classify_emotion(classifier.as_ref(), &frame)?))).await
}

pub async fn emotion_last(State(state): State<AppState>) -> Json<LastResponse<LabelTick>> {
    Json(LastResponse {
        result: state.workers.emotion.last(),
    })
}

pub async fn action_last(State(state): State<AppState>) -> Json<LastResponse<LabelTick>> {
    Json(LastResponse {
        result: state.workers.action.last(),
    })
}

pub async fn audio_last(State(state): State<AppState>) -> Json<LastResponse<AudioTick>> {
    Json(LastResponse {
        result: state.workers.audio.last(),
    })
}
