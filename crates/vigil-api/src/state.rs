//! Application state.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};
use vigil_db::EventStore;
use vigil_perception::collaborators::{
    ActionClassifier, AudioSource, FaceAnalyzer, FrameSource, LabelClassifier, ObjectDetector,
};
use vigil_perception::workers::{
    ActionPerception, AudioPerception, CapturePerception, EmotionPerception, FacePerception,
};
use vigil_perception::{
    CaptureGate, FrameStore, IdentityResolver, IngestionLoop, PerceptionConfig, PerceptionWorker,
};
use vigil_storage::Uploader;

use crate::config::ApiConfig;

/// External collaborators the core is wired against.
pub struct Collaborators {
    pub camera: Arc<dyn FrameSource>,
    pub detector: Arc<dyn ObjectDetector>,
    pub faces: Arc<dyn FaceAnalyzer>,
    pub action: Arc<dyn ActionClassifier>,
    pub microphone: Arc<dyn AudioSource>,
    /// Hosted emotion classifier, when a URL and token are configured
    pub emotion: Option<Arc<dyn LabelClassifier>>,
    pub audio_remote: Option<Arc<dyn LabelClassifier>>,
    pub audio_local: Option<Arc<dyn LabelClassifier>>,
    pub uploader: Arc<dyn Uploader>,
}

/// The five perception workers.
pub struct Workers {
    pub capture: PerceptionWorker<CapturePerception>,
    pub face: PerceptionWorker<FacePerception>,
    pub emotion: PerceptionWorker<EmotionPerception>,
    pub action: PerceptionWorker<ActionPerception>,
    pub audio: PerceptionWorker<AudioPerception>,
}

impl Workers {
    pub fn start_all(&self) {
        self.capture.start();
        self.face.start();
        self.emotion.start();
        self.action.start();
        self.audio.start();
    }

    /// Stop every worker, each bounded by its grace period.
    pub fn stop_all(&self) {
        let stopped = [
            (self.capture.name(), self.capture.stop()),
            (self.face.name(), self.face.stop()),
            (self.emotion.name(), self.emotion.stop()),
            (self.action.name(), self.action.stop()),
            (self.audio.name(), self.audio.stop()),
        ];
        for (name, clean) in stopped {
            if !clean {
                warn!(worker = name, "Worker abandoned at shutdown");
            }
        }
    }

    /// Running flag per worker name.
    pub fn running(&self) -> BTreeMap<&'static str, bool> {
        BTreeMap::from([
            (self.capture.name(), self.capture.is_running()),
            (self.face.name(), self.face.is_running()),
            (self.emotion.name(), self.emotion.is_running()),
            (self.action.name(), self.action.is_running()),
            (self.audio.name(), self.audio.is_running()),
        ])
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub frames: Arc<FrameStore>,
    pub store: Arc<EventStore>,
    pub resolver: IdentityResolver,
    pub faces: Arc<dyn FaceAnalyzer>,
    pub emotion: Option<Arc<dyn LabelClassifier>>,
    pub capture: Arc<CaptureGate>,
    pub ingestion: Arc<IngestionLoop>,
    pub workers: Arc<Workers>,
}

impl AppState {
    /// Wire the frame store, ingestion loop, capture gate and workers. Nothing is started.
    pub fn new(
        config: ApiConfig,
        perception: &PerceptionConfig,
        store: Arc<EventStore>,
        collaborators: Collaborators,
    ) -> Self {
        let Collaborators {
            camera,
            detector,
            faces,
            action,
            microphone,
            emotion,
            audio_remote,
            audio_local,
            uploader,
        } = collaborators;

        let frames = Arc::new(FrameStore::new());
        let ingestion = Arc::new(IngestionLoop::new(
            camera,
            detector,
            Arc::clone(&frames),
            perception.shutdown_grace,
        ));
        let resolver = IdentityResolver::new(
            Arc::clone(&store),
            perception.face_match_threshold,
            perception.unknown_match_threshold,
        );
        let capture = Arc::new(CaptureGate::new(
            Arc::clone(&frames),
            uploader,
            Arc::clone(&store),
            perception.capture_dir.clone(),
            perception.upload_cooldown,
        ));

        let grace = perception.shutdown_grace;
        let workers = Workers {
            capture: PerceptionWorker::new(
                CapturePerception::new(
                    Arc::clone(&capture),
                    Arc::clone(&frames),
                    perception.capture_interval,
                ),
                grace,
            ),
            face: PerceptionWorker::new(
                FacePerception::new(
                    Arc::clone(&faces),
                    resolver.clone(),
                    Arc::clone(&frames),
                    perception.face_interval,
                ),
                grace,
            ),
            emotion: PerceptionWorker::new(
                EmotionPerception::new(
                    emotion.clone(),
                    Arc::clone(&frames),
                    perception.emotion_interval,
                ),
                grace,
            ),
            action: PerceptionWorker::new(
                ActionPerception::new(
                    action,
                    Arc::clone(&frames),
                    perception.action_interval,
                    perception.action_window,
                    perception.action_frames,
                ),
                grace,
            ),
            audio: PerceptionWorker::new(
                AudioPerception::new(
                    microphone,
                    audio_remote,
                    audio_local,
                    Arc::clone(&store),
                    perception.audio_alert_labels.clone(),
                    perception.audio_alert_threshold,
                    perception.audio_window,
                    perception.audio_interval,
                ),
                grace,
            ),
        };

        Self {
            config,
            frames,
            store,
            resolver,
            faces,
            emotion,
            capture,
            ingestion,
            workers: Arc::new(workers),
        }
    }

    /// Start ingestion, then the workers.
    pub fn start(&self) {
        if self.ingestion.start() {
            info!("Ingestion started");
        }
        self.workers.start_all();
    }

    /// Stop the workers, then ingestion.
    pub fn shutdown(&self) {
        self.workers.stop_all();
        if !self.ingestion.stop() {
            warn!("Camera read still blocked at shutdown");
        }
        info!("Perception stopped");
    }
}
