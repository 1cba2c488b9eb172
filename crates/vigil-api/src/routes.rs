//! API routes.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{
    action_last, add_face_sample, attendance, audio_last, capture, detections, emotion,
    emotion_last, face_last, health, list_events, list_faces, recognize_face, register_face,
    video_stream,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, request_id, request_logging, security_headers};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let vision_routes = Router::new()
        .route("/video-stream", get(video_stream))
        .route("/detections", get(detections))
        .route("/capture", post(capture));

    let face_routes = Router::new()
        .route("/faces", get(list_faces))
        .route("/faces/:id/samples", post(add_face_sample))
        .route("/face/register", post(register_face))
        .route("/face/recognize", post(recognize_face))
        .route("/face/last", get(face_last));

    let result_routes = Router::new()
        .route("/emotion", post(emotion))
        .route("/emotion/last", get(emotion_last))
        .route("/action/last", get(action_last))
        .route("/audio/last", get(audio_last));

    let timeline_routes = Router::new()
        .route("/events", get(list_events))
        .route("/attendance", get(attendance));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .route("/health", get(health))
        .merge(vision_routes)
        .merge(face_routes)
        .merge(result_routes)
        .merge(timeline_routes)
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
