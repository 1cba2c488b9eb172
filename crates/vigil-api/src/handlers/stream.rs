//! MJPEG live view.

use std::convert::Infallible;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use bytes::{BufMut, Bytes, BytesMut};
use futures_util::stream;
use tracing::debug;
use vigil_models::{Frame, FrameVariant};
use vigil_perception::annotate::{draw_boxes, encode_jpeg, FACE_COLOR};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const BOUNDARY: &str = "frame";
const NO_FRAME_WAIT: Duration = Duration::from_millis(50);

/// Wrap one JPEG as a multipart part.
pub fn mjpeg_part(jpeg: &[u8]) -> Bytes {
    let mut part = BytesMut::with_capacity(jpeg.len() + 64);
    part.put_slice(format!("--{BOUNDARY}\r\nContent-Type: image/jpeg\r\n\r\n").as_bytes());
    part.put_slice(jpeg);
    part.put_slice(b"\r\n");
    part.freeze()
}

/// Annotated frame with the latest face boxes on top.
fn render(state: &AppState) -> Option<Frame> {
    let frame = state.frames.frame(FrameVariant::Annotated)?;
    let faces: Vec<_> = state
        .workers
        .face
        .last()
        .and_then(|last| last.outcome.result().cloned())
        .map(|tick| tick.faces.iter().map(|f| (f.bbox, FACE_COLOR)).collect())
        .unwrap_or_default();
    if faces.is_empty() {
        Some(frame)
    } else {
        Some(draw_boxes(&frame, &faces))
    }
}

async fn next_part(state: &AppState) -> Option<Bytes> {
    let state = state.clone();
    let encoded = tokio::task::spawn_blocking(move || {
        let frame = render(&state)?;
        match encode_jpeg(&frame) {
            Ok(jpeg) => Some(mjpeg_part(&jpeg)),
            Err(e) => {
                debug!("Dropping stream frame: {}", e);
                None
            }
        }
    })
    .await;
    encoded.ok().flatten()
}

/// `multipart/x-mixed-replace` stream of the annotated frame at `STREAM_FPS`.
pub async fn video_stream(State(state): State<AppState>) -> ApiResult<Response> {
    if !state.ingestion.is_running() {
        return Err(ApiError::unavailable("camera_unavailable"));
    }
    let delay = Duration::from_secs_f64(1.0 / f64::from(state.config.stream_fps.max(1)));

    let parts = stream::unfold(state, move |state| async move {
        loop {
            if !state.ingestion.is_running() {
                return None;
            }
            if let Some(part) = next_part(&state).await {
                tokio::time::sleep(delay).await;
                return Some((Ok::<_, Infallible>(part), state));
            }
            tokio::time::sleep(NO_FRAME_WAIT).await;
        }
    });

    Ok((
        [(
            header::CONTENT_TYPE,
            format!("multipart/x-mixed-replace; boundary={BOUNDARY}"),
        )],
        Body::from_stream(parts),
    )
        .into_response())
}
