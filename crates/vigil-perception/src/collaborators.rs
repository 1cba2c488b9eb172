//! Contracts for the external collaborators the core depends on.
//!
//! Every call blocks the calling thread. Implementations must be safe to
//! share between the ingestion loop, the workers and the API.

use std::time::Duration;

use serde::Serialize;
use vigil_ml_client::{HostedClassifier, MlServiceClient};
use vigil_models::{BoundingBox, Detection, FaceObservation, Frame, LabelScore};

use crate::error::PerceptionResult;

/// Live video frames.
pub trait FrameSource: Send + Sync {
    /// Next frame, or `None` when nothing is available right now.
    fn read(&self) -> PerceptionResult<Option<Frame>>;
}

/// Object detector run by the ingestion loop.
pub trait ObjectDetector: Send + Sync {
    fn detect(&self, frame: &Frame) -> PerceptionResult<Vec<Detection>>;
}

/// Details about the face chosen by [`FaceAnalyzer::largest_face`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FaceMeta {
    /// Faces found in the frame
    pub faces: usize,
    /// Box of the chosen face
    pub bbox: Option<BoundingBox>,
}

/// Face detector plus embedding extractor.
pub trait FaceAnalyzer: Send + Sync {
    fn faces(&self, frame: &Frame) -> PerceptionResult<Vec<FaceObservation>>;

    /// The face with the largest box, if any.
    fn largest_face(&self, frame: &Frame) -> PerceptionResult<(Option<FaceObservation>, FaceMeta)> {
        let faces = self.faces(frame)?;
        let count = faces.len();
        let largest = faces.into_iter().max_by_key(|f| f.bbox.area());
        let meta = FaceMeta {
            faces: count,
            bbox: largest.as_ref().map(|f| f.bbox),
        };
        Ok((largest, meta))
    }
}

/// Action recognition over a short clip.
pub trait ActionClassifier: Send + Sync {
    fn classify(&self, clip: &[Frame]) -> PerceptionResult<Vec<LabelScore>>;
}

/// Bytes-in, labels-out classifier (emotion images, audio recordings).
pub trait LabelClassifier: Send + Sync {
    fn classify(&self, data: &[u8], content_type: &str) -> PerceptionResult<Vec<LabelScore>>;
}

/// Microphone recordings.
pub trait AudioSource: Send + Sync {
    /// Record `duration` of mono audio as a WAV file, or `None` when the
    /// device is unavailable.
    fn record(&self, duration: Duration) -> PerceptionResult<Option<Vec<u8>>>;
}

impl ObjectDetector for MlServiceClient {
    fn detect(&self, frame: &Frame) -> PerceptionResult<Vec<Detection>> {
        Ok(MlServiceClient::detect(self, frame)?)
    }
}

impl FaceAnalyzer for MlServiceClient {
    fn faces(&self, frame: &Frame) -> PerceptionResult<Vec<FaceObservation>> {
        Ok(MlServiceClient::faces(self, frame)?)
    }
}

impl ActionClassifier for MlServiceClient {
    fn classify(&self, clip: &[Frame]) -> PerceptionResult<Vec<LabelScore>> {
        Ok(self.classify_action(clip)?)
    }
}

/// Local audio classification through the sidecar.
impl LabelClassifier for MlServiceClient {
    fn classify(&self, data: &[u8], _content_type: &str) -> PerceptionResult<Vec<LabelScore>> {
        Ok(self.classify_audio(data)?)
    }
}

impl LabelClassifier for HostedClassifier {
    fn classify(&self, data: &[u8], content_type: &str) -> PerceptionResult<Vec<LabelScore>> {
        Ok(HostedClassifier::classify(self, data, content_type)?)
    }
}
