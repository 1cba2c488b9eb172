//! Perception configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Settings for the camera, the workers and the capture gate.
///
/// Intervals and windows below their minimum are raised to it.
#[derive(Debug, Clone)]
pub struct PerceptionConfig {
    /// Camera device path or URL
    pub camera_device: String,
    /// FFmpeg input format for the camera (`v4l2`, `avfoundation`, ...)
    pub camera_input_format: String,
    pub frame_width: u32,
    pub frame_height: u32,
    pub camera_fps: u32,
    /// Base URL of the ML sidecar
    pub ml_service_url: String,
    /// SQLite file for events and identities
    pub face_db_path: PathBuf,
    /// Root of the local capture tree
    pub capture_dir: PathBuf,
    pub capture_interval: Duration,
    pub upload_cooldown: Duration,
    pub face_interval: Duration,
    /// Known-identity acceptance threshold
    pub face_match_threshold: f32,
    /// Unknown-cluster join threshold
    pub unknown_match_threshold: f32,
    pub emotion_interval: Duration,
    pub hf_token: Option<String>,
    pub hf_emotion_url: Option<String>,
    pub hf_audio_url: Option<String>,
    pub action_interval: Duration,
    pub action_window: Duration,
    pub action_frames: usize,
    pub audio_interval: Duration,
    pub audio_window: Duration,
    pub audio_sample_rate: u32,
    pub audio_device: String,
    pub audio_input_format: String,
    /// Watch-list labels, lowercased
    pub audio_alert_labels: Vec<String>,
    pub audio_alert_threshold: f32,
    /// Model for the sidecar's local audio classifier
    pub audio_local_model: Option<String>,
    /// How long `stop()` waits for a worker loop to exit
    pub shutdown_grace: Duration,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            camera_device: "/dev/video0".to_string(),
            camera_input_format: "v4l2".to_string(),
            frame_width: 640,
            frame_height: 480,
            camera_fps: 15,
            ml_service_url: "http://localhost:8500".to_string(),
            face_db_path: PathBuf::from("faces.db"),
            capture_dir: PathBuf::from("captures"),
            capture_interval: Duration::from_secs(30),
            upload_cooldown: Duration::from_secs(10),
            face_interval: Duration::from_secs(3),
            face_match_threshold: 0.45,
            unknown_match_threshold: 0.5,
            emotion_interval: Duration::from_secs(5),
            hf_token: None,
            hf_emotion_url: None,
            hf_audio_url: None,
            action_interval: Duration::from_secs(10),
            action_window: Duration::from_secs(2),
            action_frames: 16,
            audio_interval: Duration::from_secs(5),
            audio_window: Duration::from_secs(2),
            audio_sample_rate: 16_000,
            audio_device: "default".to_string(),
            audio_input_format: "alsa".to_string(),
            audio_alert_labels: parse_labels("scream,yell,glass breaking,gunshot"),
            audio_alert_threshold: 0.6,
            audio_local_model: None,
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

impl PerceptionConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            camera_device: env_string("CAMERA_DEVICE").unwrap_or(d.camera_device),
            camera_input_format: env_string("CAMERA_INPUT_FORMAT")
                .unwrap_or(d.camera_input_format),
            frame_width: env_parse("FRAME_WIDTH").unwrap_or(d.frame_width),
            frame_height: env_parse("FRAME_HEIGHT").unwrap_or(d.frame_height),
            camera_fps: env_parse::<u32>("CAMERA_FPS").unwrap_or(d.camera_fps).max(1),
            ml_service_url: env_string("ML_SERVICE_URL").unwrap_or(d.ml_service_url),
            face_db_path: env_string("FACE_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(d.face_db_path),
            capture_dir: env_string("CAPTURE_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.capture_dir),
            capture_interval: secs_at_least("IMAGE_CAPTURE_INTERVAL", 30, 5),
            upload_cooldown: secs_at_least("UPLOAD_COOLDOWN_SECONDS", 10, 1),
            face_interval: secs_at_least("FACE_RECOGNITION_INTERVAL", 3, 1),
            face_match_threshold: env_parse("FACE_MATCH_THRESHOLD")
                .unwrap_or(d.face_match_threshold),
            unknown_match_threshold: env_parse("UNKNOWN_MATCH_THRESHOLD")
                .unwrap_or(d.unknown_match_threshold),
            emotion_interval: secs_at_least("EMOTION_INTERVAL", 5, 2),
            hf_token: env_string("HF_TOKEN"),
            hf_emotion_url: env_string("HF_EMOTION_URL"),
            hf_audio_url: env_string("HF_AUDIO_URL"),
            action_interval: secs_at_least("ACTION_INTERVAL", 10, 5),
            action_window: fractional_secs_at_least("ACTION_WINDOW_SECONDS", 2.0, 0.5),
            action_frames: env_parse::<usize>("ACTION_FRAMES").unwrap_or(16).max(8),
            audio_interval: secs_at_least("AUDIO_INTERVAL", 5, 2),
            audio_window: fractional_secs_at_least("AUDIO_WINDOW_SECONDS", 2.0, 0.5),
            audio_sample_rate: env_parse("AUDIO_SAMPLE_RATE").unwrap_or(d.audio_sample_rate),
            audio_device: env_string("AUDIO_DEVICE").unwrap_or(d.audio_device),
            audio_input_format: env_string("AUDIO_INPUT_FORMAT").unwrap_or(d.audio_input_format),
            audio_alert_labels: env_string("AUDIO_ALERT_LABELS")
                .map(|s| parse_labels(&s))
                .unwrap_or(d.audio_alert_labels),
            audio_alert_threshold: env_parse("AUDIO_ALERT_THRESHOLD")
                .unwrap_or(d.audio_alert_threshold),
            audio_local_model: env_string("AUDIO_LOCAL_MODEL"),
            shutdown_grace: Duration::from_secs(
                env_parse("WORKER_SHUTDOWN_GRACE_SECS").unwrap_or(2),
            ),
        }
    }

    /// Hosted emotion endpoint, when both URL and token are set.
    pub fn emotion_endpoint(&self) -> Option<(&str, &str)> {
        Some((self.hf_emotion_url.as_deref()?, self.hf_token.as_deref()?))
    }

    /// Hosted audio endpoint, when both URL and token are set.
    pub fn audio_endpoint(&self) -> Option<(&str, &str)> {
        Some((self.hf_audio_url.as_deref()?, self.hf_token.as_deref()?))
    }
}

/// Comma-separated watch-list, trimmed and lowercased; empty entries dropped.
pub fn parse_labels(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn secs_at_least(key: &str, default: u64, min: u64) -> Duration {
    Duration::from_secs(env_parse(key).unwrap_or(default).max(min))
}

fn fractional_secs_at_least(key: &str, default: f64, min: f64) -> Duration {
    let secs = env_parse::<f64>(key)
        .filter(|v| v.is_finite())
        .unwrap_or(default)
        .max(min);
    Duration::from_secs_f64(secs)
}
