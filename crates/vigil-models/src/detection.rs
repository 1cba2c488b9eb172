use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::BoundingBox;

/// Label the object detector uses for people; several gates key off it.
pub const PERSON_LABEL: &str = "person";

/// One object found by the detector in a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Detection {
    /// Class label, e.g. "person"
    pub label: String,
    /// Detection confidence in [0, 1]
    pub confidence: f32,
    /// Pixel box `[x, y, w, h]`
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence: confidence.clamp(0.0, 1.0),
            bbox,
        }
    }

    pub fn is_person(&self) -> bool {
        self.label == PERSON_LABEL
    }
}
