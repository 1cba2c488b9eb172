//! Periodic emotion classification with a hosted image classifier.

use std::sync::Arc;
use std::time::Duration;

use vigil_models::{Frame, FrameVariant};

use super::LabelTick;
use crate::annotate::encode_jpeg;
use crate::collaborators::LabelClassifier;
use crate::error::{PerceptionError, PerceptionResult};
use crate::frame_store::FrameStore;
use crate::worker::{Perception, StopSignal, TickOutcome};

/// Classify one frame. Shared by the worker and on-demand requests.
pub fn classify_emotion(classifier: &dyn LabelClassifier, frame: &Frame) -> PerceptionResult<LabelTick> {
    let jpeg = encode_jpeg(frame)?;
    let labels = classifier.classify(&jpeg, "image/jpeg")?;
    LabelTick::from_labels(labels)
        .ok_or_else(|| PerceptionError::NoResults("emotion classifier returned no labels".to_string()))
}

pub struct EmotionPerception {
    classifier: Option<Arc<dyn LabelClassifier>>,
    frames: Arc<FrameStore>,
    interval: Duration,
}

impl EmotionPerception {
    /// `classifier` is `None` when no hosted endpoint/token is configured; the gate then stays closed.
    pub fn new(
        classifier: Option<Arc<dyn LabelClassifier>>,
        frames: Arc<FrameStore>,
        interval: Duration,
    ) -> Self {
        Self {
            classifier,
            frames,
            interval,
        }
    }
}

impl Perception for EmotionPerception {
    type Output = LabelTick;

    fn name(&self) -> &'static str {
        "emotion"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn gate(&self) -> bool {
        self.classifier.is_some()
    }

    fn tick(&mut self, _stop: &StopSignal) -> TickOutcome<LabelTick> {
        let Some(classifier) = &self.classifier else {
            return TickOutcome::abandoned("no emotion classifier");
        };
        let result = self
            .frames
            .frame(FrameVariant::Raw)
            .ok_or(PerceptionError::NoFrame)
            .and_then(|frame| classify_emotion(classifier.as_ref(), &frame));

        match result {
            Ok(tick) => TickOutcome::ok(tick),
            Err(e) => TickOutcome::failed(e.failure_code(), e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vigil_models::{FailureCode, LabelScore, Outcome};

    struct Fixed(Vec<LabelScore>);

    impl LabelClassifier for Fixed {
        fn classify(&self, data: &[u8], content_type: &str) -> PerceptionResult<Vec<LabelScore>> {
            assert_eq!(content_type, "image/jpeg");
            assert_eq!(&data[..2], &[0xff, 0xd8]);
            Ok(self.0.clone())
        }
    }

    fn frames() -> Arc<FrameStore> {
        let frames = Arc::new(FrameStore::new());
        let f = Frame::solid(8, 8, [100, 100, 100]);
        frames.publish(f.clone(), f, Vec::new(), Utc::now());
        frames
    }

    #[test]
    fn test_gate_requires_classifier() {
        let perception = EmotionPerception::new(None, frames(), Duration::from_secs(5));
        assert!(!perception.gate());
    }

    #[test]
    fn test_tick_publishes_best_emotion() {
        let classifier: Arc<dyn LabelClassifier> = Arc::new(Fixed(vec![
            LabelScore::new("neutral", 0.2),
            LabelScore::new("happy", 0.7),
        ]));
        let mut perception =
            EmotionPerception::new(Some(classifier), frames(), Duration::from_secs(5));
        assert!(perception.gate());
        match perception.tick(&StopSignal::new()) {
            TickOutcome::Publish(result) => {
                assert_eq!(result.outcome.result().unwrap().best.label, "happy");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_empty_labels_are_no_results() {
        let classifier: Arc<dyn LabelClassifier> = Arc::new(Fixed(Vec::new()));
        let mut perception =
            EmotionPerception::new(Some(classifier), frames(), Duration::from_secs(5));
        let TickOutcome::Publish(result) = perception.tick(&StopSignal::new()) else {
            panic!("expected a published failure");
        };
        assert!(matches!(
            result.outcome,
            Outcome::Failed {
                code: FailureCode::NoResults,
                ..
            }
        ));
    }
}
