//! Wire types for the ML sidecar.
//!
//! Boxes travel as corner coordinates `[x1, y1, x2, y2]` in source-frame
//! pixels and are converted to `BoundingBox` on the way in.

use serde::{Deserialize, Serialize};
use vigil_models::{BoundingBox, Detection, Embedding, FaceObservation, LabelScore};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireDetection {
    pub label: String,
    pub confidence: f32,
    pub bbox: [f32; 4],
}

impl From<WireDetection> for Detection {
    fn from(d: WireDetection) -> Self {
        let [x1, y1, x2, y2] = d.bbox;
        Detection::new(d.label, d.confidence, BoundingBox::from_corners(x1, y1, x2, y2))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectResponse {
    #[serde(default)]
    pub detections: Vec<WireDetection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireFace {
    pub bbox: [f32; 4],
    pub embedding: Vec<f32>,
}

impl From<WireFace> for FaceObservation {
    fn from(f: WireFace) -> Self {
        let [x1, y1, x2, y2] = f.bbox;
        FaceObservation::new(
            BoundingBox::from_corners(x1, y1, x2, y2),
            Embedding::new(f.embedding),
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FacesResponse {
    #[serde(default)]
    pub faces: Vec<WireFace>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabelsResponse {
    #[serde(default)]
    pub results: Vec<LabelScore>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_detection_converts_corners() {
        let wire: WireDetection = serde_json::from_str(
            r#"{"label":"person","confidence":0.8,"bbox":[10.0,20.0,110.0,220.0]}"#,
        )
        .unwrap();
        let det = Detection::from(wire);
        assert!(det.is_person());
        assert_eq!(det.bbox, BoundingBox::new(10, 20, 100, 200));
    }

    #[test]
    fn test_missing_lists_default_to_empty() {
        let resp: FacesResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.faces.is_empty());
    }
}
