//! The five perception worker instances.

pub mod action;
pub mod audio;
pub mod capture;
pub mod emotion;
pub mod face;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use vigil_models::{top_k, LabelScore};

pub use action::ActionPerception;
pub use audio::{AudioPerception, AudioTick};
pub use capture::CapturePerception;
pub use emotion::EmotionPerception;
pub use face::{FacePerception, FaceTick};

/// Ranked labels from one classifier call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LabelTick {
    pub best: LabelScore,
    /// Best first, at most three
    pub top: Vec<LabelScore>,
}

impl LabelTick {
    /// Top-3 of `labels`; `None` when there are none.
    pub fn from_labels(labels: Vec<LabelScore>) -> Option<Self> {
        let top = top_k(labels, 3);
        let best = top.first()?.clone();
        Some(Self { best, top })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_tick_picks_best() {
        let tick = LabelTick::from_labels(vec![
            LabelScore::new("sad", 0.1),
            LabelScore::new("happy", 0.8),
            LabelScore::new("angry", 0.05),
            LabelScore::new("neutral", 0.3),
        ])
        .unwrap();
        assert_eq!(tick.best.label, "happy");
        assert_eq!(tick.top.len(), 3);
        assert!(LabelTick::from_labels(Vec::new()).is_none());
    }
}
