//! Perception metrics.
//!
//! Recorded through the `metrics` facade; the API binary installs the
//! Prometheus recorder that renders them.

use metrics::{counter, gauge, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const WORKER_TICKS_TOTAL: &str = "vigil_worker_ticks_total";
    pub const INFERENCE_DURATION_SECONDS: &str = "vigil_inference_duration_seconds";
    pub const WORKERS_RUNNING: &str = "vigil_workers_running";
    pub const FRAMES_PUBLISHED_TOTAL: &str = "vigil_frames_published_total";
    pub const CAMERA_READ_FAILURES_TOTAL: &str = "vigil_camera_read_failures_total";
    pub const CAPTURES_TOTAL: &str = "vigil_captures_total";
    pub const UPLOAD_ATTEMPTS_TOTAL: &str = "vigil_upload_attempts_total";
    pub const EVENTS_APPENDED_TOTAL: &str = "vigil_events_appended_total";
}

/// Record one worker tick with its outcome (`ok`, `failed`, `skipped`, `abandoned`).
pub fn record_tick(worker: &str, outcome: &str) {
    let labels = [
        ("worker", worker.to_string()),
        ("outcome", outcome.to_string()),
    ];
    counter!(names::WORKER_TICKS_TOTAL, &labels).increment(1);
}

/// Record the wall time of one inference tick.
pub fn record_inference_duration(worker: &str, duration_secs: f64) {
    let labels = [("worker", worker.to_string())];
    histogram!(names::INFERENCE_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn worker_started(worker: &str) {
    let labels = [("worker", worker.to_string())];
    gauge!(names::WORKERS_RUNNING, &labels).set(1.0);
}

pub fn worker_stopped(worker: &str) {
    let labels = [("worker", worker.to_string())];
    gauge!(names::WORKERS_RUNNING, &labels).set(0.0);
}

pub fn record_frame_published() {
    counter!(names::FRAMES_PUBLISHED_TOTAL).increment(1);
}

pub fn record_camera_read_failure() {
    counter!(names::CAMERA_READ_FAILURES_TOTAL).increment(1);
}

/// Record a capture request by outcome (`uploaded`, `retained`, `cooldown`, `failed`).
pub fn record_capture(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::CAPTURES_TOTAL, &labels).increment(1);
}

pub fn record_upload_attempts(attempts: u32) {
    counter!(names::UPLOAD_ATTEMPTS_TOTAL).increment(attempts as u64);
}

pub fn record_event(event_type: &str) {
    let labels = [("type", event_type.to_string())];
    counter!(names::EVENTS_APPENDED_TOTAL, &labels).increment(1);
}
