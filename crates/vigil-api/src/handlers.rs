//! Request handlers.

pub mod capture;
pub mod events;
pub mod faces;
pub mod health;
pub mod perception;
pub mod stream;

pub use capture::*;
pub use events::*;
pub use faces::*;
pub use health::*;
pub use perception::*;
pub use stream::*;

use bytes::Bytes;
use serde::Deserialize;
use vigil_models::{Frame, FrameVariant};
use vigil_perception::annotate::decode_image;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Where an image-taking endpoint gets its picture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSource {
    /// Request body holds a JPEG or PNG
    #[default]
    Upload,
    /// Latest raw camera frame
    Live,
}

/// Resolve the request image to a frame.
pub(crate) fn load_image(state: &AppState, source: ImageSource, body: &Bytes) -> ApiResult<Frame> {
    match source {
        ImageSource::Live => state
            .frames
            .frame(FrameVariant::Raw)
            .ok_or_else(|| ApiError::unavailable("camera_unavailable")),
        ImageSource::Upload => {
            if body.is_empty() {
                return Err(ApiError::bad_request("image_required"));
            }
            decode_image(body).map_err(|_| ApiError::bad_request("invalid_image"))
        }
    }
}

/// Run blocking core work off the async executor.
pub(crate) async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::internal(format!("blocking task failed: {}", e)))?
}
