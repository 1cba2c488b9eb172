//! ML sidecar client.
//!
//! The sidecar hosts the object detector, the face embedding model, the
//! action classifier and an optional local audio classifier. Frames are
//! posted as packed RGB24 with their dimensions in the query string.

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::debug;
use vigil_models::{Detection, FaceObservation, Frame, LabelScore};

use crate::error::{MlClientError, MlClientResult};
use crate::types::{DetectResponse, FacesResponse, LabelsResponse};

/// Sidecar client configuration.
#[derive(Debug, Clone)]
pub struct MlClientConfig {
    /// Base URL, e.g. `http://localhost:8500`
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Model name for local audio classification; `None` disables it
    pub audio_model: Option<String>,
}

impl Default for MlClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8500".to_string(),
            timeout: Duration::from_secs(30),
            audio_model: None,
        }
    }
}

impl MlClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("ML_SERVICE_URL").unwrap_or(defaults.base_url),
            timeout: std::env::var("ML_SERVICE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            audio_model: std::env::var("AUDIO_LOCAL_MODEL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
        }
    }
}

/// Blocking client for the ML sidecar.
#[derive(Clone)]
pub struct MlServiceClient {
    http: Client,
    config: MlClientConfig,
}

impl MlServiceClient {
    pub fn new(config: MlClientConfig) -> MlClientResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("vigil-ml-client/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, config })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Objects in one frame.
    pub fn detect(&self, frame: &Frame) -> MlClientResult<Vec<Detection>> {
        let resp: DetectResponse = self.post_frame("detect", frame)?;
        Ok(resp.detections.into_iter().map(Detection::from).collect())
    }

    /// Every face in one frame with its embedding.
    pub fn faces(&self, frame: &Frame) -> MlClientResult<Vec<FaceObservation>> {
        let resp: FacesResponse = self.post_frame("faces", frame)?;
        Ok(resp.faces.into_iter().map(FaceObservation::from).collect())
    }

    /// Ranked action labels for a clip of equally sized frames.
    pub fn classify_action(&self, clip: &[Frame]) -> MlClientResult<Vec<LabelScore>> {
        let first = clip
            .first()
            .ok_or_else(|| MlClientError::RequestFailed("empty clip".to_string()))?;
        if clip
            .iter()
            .any(|f| f.width != first.width || f.height != first.height)
        {
            return Err(MlClientError::RequestFailed(
                "clip frames differ in size".to_string(),
            ));
        }

        let mut body = Vec::with_capacity(first.expected_len() * clip.len());
        for frame in clip {
            body.extend_from_slice(&frame.data);
        }

        debug!(frames = clip.len(), "Posting action clip");
        let resp = self
            .http
            .post(self.url("action"))
            .query(&[
                ("width", first.width.to_string()),
                ("height", first.height.to_string()),
                ("frames", clip.len().to_string()),
            ])
            .header("Content-Type", "application/octet-stream")
            .body(body)
            .send()?;
        let labels: LabelsResponse = Self::parse(resp)?;
        Ok(labels.results)
    }

    /// Whether a local audio model is configured.
    pub fn has_audio_model(&self) -> bool {
        self.config.audio_model.is_some()
    }

    /// Classify a WAV recording with the local audio model.
    pub fn classify_audio(&self, wav: &[u8]) -> MlClientResult<Vec<LabelScore>> {
        let model = self
            .config
            .audio_model
            .as_deref()
            .ok_or_else(|| MlClientError::not_configured("AUDIO_LOCAL_MODEL not set"))?;

        let resp = self
            .http
            .post(self.url("audio"))
            .query(&[("model", model), ("top_k", "5")])
            .header("Content-Type", "audio/wav")
            .body(wav.to_vec())
            .send()?;
        let labels: LabelsResponse = Self::parse(resp)?;
        Ok(labels.results)
    }

    fn post_frame<T: DeserializeOwned>(&self, path: &str, frame: &Frame) -> MlClientResult<T> {
        if !frame.is_valid() {
            return Err(MlClientError::RequestFailed(format!(
                "frame buffer is {} bytes, expected {}",
                frame.data.len(),
                frame.expected_len()
            )));
        }
        let resp = self
            .http
            .post(self.url(path))
            .query(&[("width", frame.width), ("height", frame.height)])
            .header("Content-Type", "application/octet-stream")
            .body(frame.data.to_vec())
            .send()?;
        Self::parse(resp)
    }

    fn parse<T: DeserializeOwned>(resp: Response) -> MlClientResult<T> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(MlClientError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let bytes = resp.bytes()?;
        serde_json::from_slice(&bytes)
            .map_err(|e| MlClientError::invalid_response(format!("{}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_models::BoundingBox;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // Blocking clients must be built and dropped off the async runtime.
    fn client_for(uri: &str, audio_model: Option<&str>) -> MlServiceClient {
        MlServiceClient::new(MlClientConfig {
            base_url: uri.to_string(),
            timeout: Duration::from_secs(5),
            audio_model: audio_model.map(str::to_string),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_detect_posts_frame_dimensions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/detect"))
            .and(query_param("width", "4"))
            .and(query_param("height", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "detections": [
                    {"label": "person", "confidence": 0.9, "bbox": [0.0, 0.0, 2.0, 2.0]}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let uri = server.uri();
        let detections = tokio::task::spawn_blocking(move || {
            client_for(&uri, None).detect(&Frame::solid(4, 2, [0, 0, 0]))
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(detections.len(), 1);
        assert!(detections[0].is_person());
        assert_eq!(detections[0].bbox, BoundingBox::new(0, 0, 2, 2));
    }

    #[tokio::test]
    async fn test_faces_parse_embeddings() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/faces"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "faces": [{"bbox": [1.0, 1.0, 3.0, 4.0], "embedding": [0.1, 0.2, 0.3]}]
            })))
            .mount(&server)
            .await;

        let uri = server.uri();
        let faces = tokio::task::spawn_blocking(move || {
            client_for(&uri, None).faces(&Frame::solid(4, 4, [9, 9, 9]))
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].dim(), 3);
        assert_eq!(faces[0].bbox, BoundingBox::new(1, 1, 2, 3));
    }

    #[tokio::test]
    async fn test_server_error_is_reported_with_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/faces"))
            .respond_with(ResponseTemplate::new(503).set_body_string("warming up"))
            .mount(&server)
            .await;

        let uri = server.uri();
        let err = tokio::task::spawn_blocking(move || {
            client_for(&uri, None).faces(&Frame::solid(2, 2, [0, 0, 0]))
        })
        .await
        .unwrap()
        .unwrap_err();

        match err {
            MlClientError::Status { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "warming up");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_garbage_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/detect"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let uri = server.uri();
        let err = tokio::task::spawn_blocking(move || {
            client_for(&uri, None).detect(&Frame::solid(2, 2, [0, 0, 0]))
        })
        .await
        .unwrap()
        .unwrap_err();
        assert!(err.is_invalid_response());
    }

    #[tokio::test]
    async fn test_action_clip_concatenates_frames() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/action"))
            .and(query_param("frames", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{"label": "waving", "score": 0.7}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let uri = server.uri();
        let clip = vec![Frame::solid(2, 2, [1, 1, 1]); 3];
        let labels = tokio::task::spawn_blocking(move || client_for(&uri, None).classify_action(&clip))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(labels, vec![LabelScore::new("waving", 0.7)]);
    }

    #[tokio::test]
    async fn test_local_audio_names_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audio"))
            .and(query_param("model", "ast-audioset"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{"label": "Speech", "score": 0.8}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let uri = server.uri();
        let labels = tokio::task::spawn_blocking(move || {
            client_for(&uri, Some("ast-audioset")).classify_audio(b"RIFF....WAVE")
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(labels[0].label, "Speech");
    }

    #[test]
    fn test_audio_requires_model() {
        let client = MlServiceClient::new(MlClientConfig::default()).unwrap();
        assert!(!client.has_audio_model());
        let err = client.classify_audio(b"RIFF").unwrap_err();
        assert!(matches!(err, MlClientError::NotConfigured(_)));
    }

    #[test]
    fn test_invalid_frame_is_rejected_before_sending() {
        let client = MlServiceClient::new(MlClientConfig::default()).unwrap();
        let err = client.detect(&Frame::new(4, 4, vec![0u8; 3])).unwrap_err();
        assert!(matches!(err, MlClientError::RequestFailed(_)));
    }
}
