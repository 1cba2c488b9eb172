//! Shared data models for the Vigil perception backend.
//!
//! This crate provides Serde-serializable types for:
//! - Frames, detections and bounding boxes
//! - Face embeddings, identities and unknown clusters
//! - Timeline events and attendance rows
//! - Per-worker tick results with typed failure codes

pub mod detection;
pub mod embedding;
pub mod event;
pub mod face;
pub mod frame;
pub mod geometry;
pub mod label;
pub mod result;

// Re-export common types
pub use detection::{Detection, PERSON_LABEL};
pub use embedding::Embedding;
pub use event::{AttendanceEntry, Event, EventType, EventTypeParseError, FaceType, NewEvent};
pub use face::{
    FaceObservation, IdentityMatch, IdentitySummary, StoredSample, UnknownCluster,
};
pub use frame::{Frame, FrameVariant};
pub use geometry::BoundingBox;
pub use label::{top_k, LabelScore};
pub use result::{FailureCode, Outcome, TickResult};
