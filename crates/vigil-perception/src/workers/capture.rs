//! Timer-driven capture.

use std::sync::Arc;
use std::time::Duration;

use vigil_models::PERSON_LABEL;

use crate::capture::{CaptureGate, CaptureOutcome};
use crate::frame_store::FrameStore;
use crate::worker::{Perception, StopSignal, TickOutcome};

pub struct CapturePerception {
    gate: Arc<CaptureGate>,
    frames: Arc<FrameStore>,
    interval: Duration,
}

impl CapturePerception {
    pub fn new(gate: Arc<CaptureGate>, frames: Arc<FrameStore>, interval: Duration) -> Self {
        Self {
            gate,
            frames,
            interval,
        }
    }
}

impl Perception for CapturePerception {
    type Output = CaptureOutcome;

    fn name(&self) -> &'static str {
        "capture"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn gate(&self) -> bool {
        self.frames.has_label(PERSON_LABEL)
    }

    fn tick(&mut self, _stop: &StopSignal) -> TickOutcome<CaptureOutcome> {
        match self.gate.request_auto_capture() {
            None => TickOutcome::abandoned("person left the frame"),
            Some(CaptureOutcome::Failed { code, error, .. }) => TickOutcome::failed(code, error),
            Some(outcome) => TickOutcome::ok(outcome),
        }
    }
}
