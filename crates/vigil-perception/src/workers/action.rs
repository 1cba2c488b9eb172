//! Periodic action recognition over a short sampled clip.

use std::sync::Arc;
use std::time::Duration;

use vigil_models::{FailureCode, Frame, FrameVariant, PERSON_LABEL};

use super::LabelTick;
use crate::collaborators::ActionClassifier;
use crate::frame_store::FrameStore;
use crate::worker::{Perception, StopSignal, TickOutcome};

pub struct ActionPerception {
    classifier: Arc<dyn ActionClassifier>,
    frames: Arc<FrameStore>,
    interval: Duration,
    window: Duration,
    clip_frames: usize,
}

impl ActionPerception {
    pub fn new(
        classifier: Arc<dyn ActionClassifier>,
        frames: Arc<FrameStore>,
        interval: Duration,
        window: Duration,
        clip_frames: usize,
    ) -> Self {
        Self {
            classifier,
            frames,
            interval,
            window,
            clip_frames: clip_frames.max(1),
        }
    }

    /// Pull `clip_frames` frames spread evenly over the window.
    ///
    /// Returns `None` if stopped midway.
    fn sample_clip(&self, stop: &StopSignal) -> Option<Vec<Frame>> {
        let spacing = self.window / self.clip_frames as u32;
        let mut clip = Vec::with_capacity(self.clip_frames);
        for i in 0..self.clip_frames {
            if let Some(frame) = self.frames.frame(FrameVariant::Raw) {
                clip.push(frame);
            }
            if i + 1 < self.clip_frames && stop.wait_timeout(spacing) {
                return None;
            }
        }
        Some(clip)
    }
}

impl Perception for ActionPerception {
    type Output = LabelTick;

    fn name(&self) -> &'static str {
        "action"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn gate(&self) -> bool {
        self.frames.has_label(PERSON_LABEL)
    }

    fn tick(&mut self, stop: &StopSignal) -> TickOutcome<LabelTick> {
        let Some(clip) = self.sample_clip(stop) else {
            return TickOutcome::abandoned("stopped while sampling");
        };
        if clip.len() * 2 < self.clip_frames {
            return TickOutcome::abandoned(format!(
                "only {} of {} frames available",
                clip.len(),
                self.clip_frames
            ));
        }

        match self.classifier.classify(&clip) {
            Ok(labels) => match LabelTick::from_labels(labels) {
                Some(tick) => TickOutcome::ok(tick),
                None => TickOutcome::failed(FailureCode::NoResults, "action classifier returned no labels"),
            },
            Err(e) => TickOutcome::failed(e.failure_code(), e.to_string()),
        }
    }
}
