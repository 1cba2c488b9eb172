//! Camera ingestion loop.
//!
//! Reads frames, runs the object detector, draws the annotated copy and
//! publishes both to the [`FrameStore`]. A missing frame backs off briefly;
//! a detector failure still publishes the raw frame with no detections so
//! readers keep seeing live video.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::annotate::annotate_detections;
use crate::collaborators::{FrameSource, ObjectDetector};
use crate::frame_store::FrameStore;
use crate::metrics;
use crate::retry::FailureTracker;
use crate::worker::StopSignal;

/// Back-off when the camera has nothing to give.
pub const NO_FRAME_BACKOFF: Duration = Duration::from_millis(20);

/// Consecutive failures logged before suppression kicks in.
const MAX_LOGGED_FAILURES: u32 = 5;

/// One pass of the ingestion loop; exposed for tests and single-step use.
pub struct IngestionStep {
    source: Arc<dyn FrameSource>,
    detector: Arc<dyn ObjectDetector>,
    frames: Arc<FrameStore>,
    read_failures: FailureTracker,
    detect_failures: FailureTracker,
}

impl IngestionStep {
    pub fn new(
        source: Arc<dyn FrameSource>,
        detector: Arc<dyn ObjectDetector>,
        frames: Arc<FrameStore>,
    ) -> Self {
        Self {
            source,
            detector,
            frames,
            read_failures: FailureTracker::new(MAX_LOGGED_FAILURES),
            detect_failures: FailureTracker::new(MAX_LOGGED_FAILURES),
        }
    }

    /// Read, detect and publish one frame. Returns false when no frame was available.
    pub fn run_once(&mut self) -> bool {
        let frame = match self.source.read() {
            Ok(Some(frame)) => {
                self.read_failures.record_success("camera read");
                frame
            }
            Ok(None) => return false,
            Err(e) => {
                metrics::record_camera_read_failure();
                if self.read_failures.record_failure("camera read") {
                    warn!("Camera read failed: {}", e);
                }
                return false;
            }
        };

        let captured_at = Utc::now();
        let detections = match self.detector.detect(&frame) {
            Ok(detections) => {
                self.detect_failures.record_success("object detection");
                detections
            }
            Err(e) => {
                if self.detect_failures.record_failure("object detection") {
                    warn!("Object detection failed: {}", e);
                }
                Vec::new()
            }
        };

        let annotated = annotate_detections(&frame, &detections);
        self.frames.publish(frame, annotated, detections, captured_at);
        metrics::record_frame_published();
        true
    }
}

struct Running {
    stop: Arc<StopSignal>,
    done: Receiver<IngestionStep>,
    handle: JoinHandle<()>,
}

/// Owns the ingestion thread.
pub struct IngestionLoop {
    step: Mutex<Option<IngestionStep>>,
    running: Mutex<Option<Running>>,
    alive: Arc<AtomicBool>,
    grace: Duration,
}

impl IngestionLoop {
    pub fn new(
        source: Arc<dyn FrameSource>,
        detector: Arc<dyn ObjectDetector>,
        frames: Arc<FrameStore>,
        grace: Duration,
    ) -> Self {
        Self {
            step: Mutex::new(Some(IngestionStep::new(source, detector, frames))),
            running: Mutex::new(None),
            alive: Arc::new(AtomicBool::new(false)),
            grace,
        }
    }

    /// Start the loop thread. No-op when already running.
    pub fn start(&self) -> bool {
        let mut running = self.running.lock();
        if running.is_some() {
            return false;
        }
        let Some(mut step) = self.step.lock().take() else {
            warn!("Ingestion cannot restart: previous loop never exited");
            return false;
        };

        let stop = Arc::new(StopSignal::new());
        let (tx, rx) = mpsc::channel();
        let loop_stop = Arc::clone(&stop);
        let alive = Arc::clone(&self.alive);
        alive.store(true, Ordering::SeqCst);

        let spawned = thread::Builder::new()
            .name("vigil-ingestion".to_string())
            .spawn(move || {
                info!("Ingestion loop started");
                while !loop_stop.is_stopped() {
                    if !step.run_once() && loop_stop.wait_timeout(NO_FRAME_BACKOFF) {
                        break;
                    }
                }
                alive.store(false, Ordering::SeqCst);
                info!("Ingestion loop stopped");
                let _ = tx.send(step);
            });

        match spawned {
            Ok(handle) => {
                *running = Some(Running {
                    stop,
                    done: rx,
                    handle,
                });
                true
            }
            Err(e) => {
                self.alive.store(false, Ordering::SeqCst);
                warn!("Failed to spawn ingestion thread: {}", e);
                false
            }
        }
    }

    /// Signal the loop and wait up to the grace period for the current read to finish.
    ///
    /// Returns false when the read was still blocked at the deadline; the
    /// thread is then left behind and the loop cannot be restarted.
    pub fn stop(&self) -> bool {
        let Some(running) = self.running.lock().take() else {
            return true;
        };
        running.stop.stop();

        match running.done.recv_timeout(self.grace) {
            Ok(step) => {
                let _ = running.handle.join();
                *self.step.lock() = Some(step);
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    grace_secs = self.grace.as_secs_f64(),
                    "Ingestion did not stop within grace period"
                );
                false
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = running.handle.join();
                warn!("Ingestion thread exited abnormally");
                false
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PerceptionError, PerceptionResult};
    use std::collections::VecDeque;
    use std::time::Instant;
    use vigil_models::{BoundingBox, Detection, Frame, FrameVariant};

    struct Scripted(Mutex<VecDeque<PerceptionResult<Option<Frame>>>>);

    impl FrameSource for Scripted {
        fn read(&self) -> PerceptionResult<Option<Frame>> {
            self.0.lock().pop_front().unwrap_or(Ok(None))
        }
    }

    struct FixedDetector(Option<Vec<Detection>>);

    impl ObjectDetector for FixedDetector {
        fn detect(&self, _frame: &Frame) -> PerceptionResult<Vec<Detection>> {
            self.0
                .clone()
                .ok_or_else(|| PerceptionError::inference_failed("model offline"))
        }
    }

    fn person() -> Detection {
        Detection::new("person", 0.9, BoundingBox::new(1, 1, 4, 4))
    }

    #[test]
    fn test_step_publishes_detections_and_annotation() {
        let frames = Arc::new(FrameStore::new());
        let source = Scripted(Mutex::new(VecDeque::from(vec![
            Ok(None),
            Err(PerceptionError::camera("device busy")),
            Ok(Some(Frame::solid(8, 8, [0, 0, 0]))),
        ])));
        let mut step = IngestionStep::new(
            Arc::new(source),
            Arc::new(FixedDetector(Some(vec![person()]))),
            Arc::clone(&frames),
        );

        assert!(!step.run_once());
        assert!(!step.run_once());
        assert!(!frames.is_ready());
        assert!(step.run_once());

        let snap = frames.latest().unwrap();
        assert!(snap.has_label("person"));
        assert_ne!(snap.raw, snap.annotated);
        assert_eq!(frames.frame(FrameVariant::Raw), Some(Frame::solid(8, 8, [0, 0, 0])));
    }

    #[test]
    fn test_detector_failure_still_publishes_raw_frame() {
        let frames = Arc::new(FrameStore::new());
        let source = Scripted(Mutex::new(VecDeque::from(vec![Ok(Some(Frame::solid(
            4,
            4,
            [5, 5, 5],
        )))])));
        let mut step = IngestionStep::new(
            Arc::new(source),
            Arc::new(FixedDetector(None)),
            Arc::clone(&frames),
        );
        assert!(step.run_once());
        let snap = frames.latest().unwrap();
        assert!(snap.detections.is_empty());
        assert_eq!(snap.raw, snap.annotated);
    }

    #[test]
    fn test_loop_runs_until_stopped() {
        let frames = Arc::new(FrameStore::new());
        let frames_in: VecDeque<_> = (0..3)
            .map(|_| Ok(Some(Frame::solid(2, 2, [1, 1, 1]))))
            .collect();
        let ingestion = IngestionLoop::new(
            Arc::new(Scripted(Mutex::new(frames_in))),
            Arc::new(FixedDetector(Some(Vec::new()))),
            Arc::clone(&frames),
            Duration::from_secs(5),
        );
        assert!(ingestion.start());
        assert!(!ingestion.start());

        let deadline = Instant::now() + Duration::from_secs(5);
        while frames.published() < 3 {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(5));
        }
        assert!(ingestion.stop());
        assert!(!ingestion.is_running());
        assert_eq!(frames.published(), 3);

        // Stopped cleanly, so it can run again
        assert!(ingestion.start());
        assert!(ingestion.stop());
    }

    /// Camera whose read blocks until released.
    struct Blocked(Mutex<bool>, parking_lot::Condvar);

    impl FrameSource for Blocked {
        fn read(&self) -> PerceptionResult<Option<Frame>> {
            let mut released = self.0.lock();
            while !*released {
                self.1.wait(&mut released);
            }
            Ok(None)
        }
    }

    #[test]
    fn test_stop_is_bounded_by_grace() {
        let camera = Arc::new(Blocked(Mutex::new(false), parking_lot::Condvar::new()));
        let ingestion = IngestionLoop::new(
            camera.clone(),
            Arc::new(FixedDetector(Some(Vec::new()))),
            Arc::new(FrameStore::new()),
            Duration::from_millis(50),
        );
        assert!(ingestion.start());
        thread::sleep(Duration::from_millis(20));

        let started = Instant::now();
        assert!(!ingestion.stop());
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!ingestion.start());

        // Let the stranded thread finish
        *camera.0.lock() = true;
        camera.1.notify_all();
    }
}
