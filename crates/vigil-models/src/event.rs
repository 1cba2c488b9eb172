//! Timeline events.
//!
//! Events are append-only. Ordering by `id` is the canonical timeline order.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::BoundingBox;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A face was resolved to a known identity or an unknown cluster.
    FaceRecognized,
    /// A watch-listed sound crossed the alert threshold.
    AudioAlert,
    /// A frame was captured and uploaded or retained locally.
    Capture,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::FaceRecognized => "face_recognized",
            EventType::AudioAlert => "audio_alert",
            EventType::Capture => "capture",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventType {
    type Err = EventTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "face_recognized" => Ok(EventType::FaceRecognized),
            "audio_alert" => Ok(EventType::AudioAlert),
            "capture" => Ok(EventType::Capture),
            _ => Err(EventTypeParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown event kind: {0}")]
pub struct EventTypeParseError(String);

/// Subject of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FaceType {
    Known,
    Unknown,
    Audio,
    Other,
}

impl FaceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaceType::Known => "known",
            FaceType::Unknown => "unknown",
            FaceType::Audio => "audio",
            FaceType::Other => "other",
        }
    }
}

impl fmt::Display for FaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FaceType {
    type Err = EventTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "known" => Ok(FaceType::Known),
            "unknown" => Ok(FaceType::Unknown),
            "audio" => Ok(FaceType::Audio),
            "other" => Ok(FaceType::Other),
            _ => Err(EventTypeParseError(s.to_string())),
        }
    }
}

/// A persisted timeline event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Event {
    pub id: i64,
    pub event_type: EventType,
    pub face_type: FaceType,
    pub face_id: Option<i64>,
    pub name: Option<String>,
    pub score: Option<f32>,
    pub bbox: Option<BoundingBox>,
    pub created_at: DateTime<Utc>,
}

/// An event that has not been appended yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub event_type: EventType,
    pub face_type: FaceType,
    pub face_id: Option<i64>,
    pub name: Option<String>,
    pub score: Option<f32>,
    pub bbox: Option<BoundingBox>,
}

impl NewEvent {
    /// Face resolved to a registered identity.
    pub fn known_face(id: i64, name: impl Into<String>, score: f32, bbox: BoundingBox) -> Self {
        Self {
            event_type: EventType::FaceRecognized,
            face_type: FaceType::Known,
            face_id: Some(id),
            name: Some(name.into()),
            score: Some(score),
            bbox: Some(bbox),
        }
    }

    /// Face assigned to an unknown cluster.
    pub fn unknown_face(
        cluster_id: i64,
        name: impl Into<String>,
        score: Option<f32>,
        bbox: BoundingBox,
    ) -> Self {
        Self {
            event_type: EventType::FaceRecognized,
            face_type: FaceType::Unknown,
            face_id: Some(cluster_id),
            name: Some(name.into()),
            score,
            bbox: Some(bbox),
        }
    }

    /// Audio alert; never carries a box.
    pub fn audio_alert(label: impl Into<String>, score: f32) -> Self {
        Self {
            event_type: EventType::AudioAlert,
            face_type: FaceType::Audio,
            face_id: None,
            name: Some(label.into()),
            score: Some(score),
            bbox: None,
        }
    }

    /// Frame capture, named after the capture reason.
    pub fn capture(reason: impl Into<String>) -> Self {
        Self {
            event_type: EventType::Capture,
            face_type: FaceType::Other,
            face_id: None,
            name: Some(reason.into()),
            score: None,
            bbox: None,
        }
    }
}

/// Known-face sightings aggregated by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AttendanceEntry {
    pub name: String,
    pub total: u32,
    pub last_seen: DateTime<Utc>,
}
