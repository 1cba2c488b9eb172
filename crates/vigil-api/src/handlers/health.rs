//! Health check handler.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
    /// Ingestion loop is reading the camera
    pub camera: bool,
    /// At least one frame has been published
    pub frames_ready: bool,
    pub uploader: bool,
    pub workers: BTreeMap<&'static str, bool>,
}

/// Liveness plus a summary of the perception pipeline.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        camera: state.ingestion.is_running(),
        frames_ready: state.frames.is_ready(),
        uploader: state.capture.uploads_enabled(),
        workers: state.workers.running(),
    })
}
