//! Perception core.
//!
//! This crate provides:
//! - The Frame Store shared between the ingestion loop and every worker
//! - A generic polling worker and its five instances (capture, face,
//!   emotion, action, audio)
//! - Identity resolution with greedy unknown-face clustering
//! - The cooldown-debounced Capture Gate with retried uploads
//! - FFmpeg-backed camera and microphone sources
//!
//! Every long-running loop owns one OS thread. Nothing here needs an
//! async runtime.

pub mod annotate;
pub mod capture;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod frame_store;
pub mod ingestion;
pub mod logging;
pub mod metrics;
pub mod resolver;
pub mod retry;
pub mod sources;
pub mod worker;
pub mod workers;

pub use capture::{CaptureGate, CaptureOutcome, CaptureReason};
pub use collaborators::{
    ActionClassifier, AudioSource, FaceAnalyzer, FaceMeta, FrameSource, LabelClassifier,
    ObjectDetector,
};
pub use config::PerceptionConfig;
pub use error::{PerceptionError, PerceptionResult};
pub use frame_store::{FrameSnapshot, FrameStore};
pub use ingestion::IngestionLoop;
pub use logging::WorkerLogger;
pub use resolver::{FaceResolution, IdentityResolver, Resolution};
pub use retry::{FailureTracker, RetryConfig, RetryResult};
pub use sources::{FfmpegCamera, FfmpegMicrophone};
pub use worker::{Perception, PerceptionWorker, StopSignal, TickOutcome};
pub use workers::{AudioTick, FaceTick, LabelTick};
