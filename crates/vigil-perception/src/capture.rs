//! Cooldown-debounced frame capture.
//!
//! A capture reserves its cooldown slot before doing any work, so two
//! requests racing inside the cooldown window cannot both encode and
//! upload. The encoded JPEG is always written locally first; the local
//! copy is removed only after an upload succeeds.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use vigil_db::EventStore;
use vigil_models::{FailureCode, FrameVariant, NewEvent, PERSON_LABEL};
use vigil_storage::{dated_key, Uploader};

use crate::annotate::encode_jpeg;
use crate::frame_store::FrameStore;
use crate::metrics;
use crate::retry::{retry_blocking, RetryConfig, RetryResult};

const CONTENT_TYPE: &str = "image/jpeg";

/// Who asked for the capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CaptureReason {
    /// Timer-driven, person-gated
    Auto,
    /// On-demand via the API
    Manual,
}

impl CaptureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureReason::Auto => "auto",
            CaptureReason::Manual => "manual",
        }
    }
}

impl fmt::Display for CaptureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of one capture request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CaptureOutcome {
    /// Uploaded; the local copy was removed.
    Uploaded {
        reason: CaptureReason,
        url: String,
        key: String,
    },
    /// Upload failed or is disabled; the local copy was kept.
    Retained {
        reason: CaptureReason,
        local_path: String,
        error: String,
    },
    /// Rejected because the previous capture was too recent. No work was done.
    Cooldown {
        reason: CaptureReason,
        retry_after_ms: u64,
    },
    Failed {
        reason: CaptureReason,
        code: FailureCode,
        error: String,
    },
}

impl CaptureOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureOutcome::Uploaded { .. } => "uploaded",
            CaptureOutcome::Retained { .. } => "retained",
            CaptureOutcome::Cooldown { .. } => "cooldown",
            CaptureOutcome::Failed { .. } => "failed",
        }
    }

    pub fn is_cooldown(&self) -> bool {
        matches!(self, CaptureOutcome::Cooldown { .. })
    }
}

/// Capture trigger shared by the capture worker and the API.
pub struct CaptureGate {
    frames: Arc<FrameStore>,
    uploader: Arc<dyn Uploader>,
    store: Arc<EventStore>,
    capture_dir: PathBuf,
    cooldown: Duration,
    retry: RetryConfig,
    last_capture: Mutex<Option<Instant>>,
}

impl CaptureGate {
    pub fn new(
        frames: Arc<FrameStore>,
        uploader: Arc<dyn Uploader>,
        store: Arc<EventStore>,
        capture_dir: impl Into<PathBuf>,
        cooldown: Duration,
    ) -> Self {
        Self {
            frames,
            uploader,
            store,
            capture_dir: capture_dir.into(),
            cooldown,
            retry: RetryConfig::new("capture_upload"),
            last_capture: Mutex::new(None),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn uploads_enabled(&self) -> bool {
        self.uploader.is_enabled()
    }

    /// Timer-driven capture: does nothing unless a person is in view.
    pub fn request_auto_capture(&self) -> Option<CaptureOutcome> {
        if !self.frames.has_label(PERSON_LABEL) {
            return None;
        }
        Some(self.request_capture(CaptureReason::Auto))
    }

    /// Capture now unless the cooldown is still running.
    pub fn request_capture(&self, reason: CaptureReason) -> CaptureOutcome {
        if let Err(remaining) = self.reserve() {
            metrics::record_capture("cooldown");
            return CaptureOutcome::Cooldown {
                reason,
                retry_after_ms: remaining.as_millis() as u64,
            };
        }

        let outcome = self.capture(reason);
        metrics::record_capture(outcome.as_str());
        if matches!(
            outcome,
            CaptureOutcome::Uploaded { .. } | CaptureOutcome::Retained { .. }
        ) {
            match self.store.append_event(&NewEvent::capture(reason.as_str())) {
                Ok(event) => metrics::record_event(event.event_type.as_str()),
                Err(e) => warn!("Failed to record capture event: {}", e),
            }
        }
        outcome
    }

    /// Check the cooldown and take the slot in one step.
    fn reserve(&self) -> Result<(), Duration> {
        let mut last = self.last_capture.lock();
        let now = Instant::now();
        if let Some(prev) = *last {
            let elapsed = now.saturating_duration_since(prev);
            if elapsed < self.cooldown {
                return Err(self.cooldown - elapsed);
            }
        }
        *last = Some(now);
        Ok(())
    }

    fn capture(&self, reason: CaptureReason) -> CaptureOutcome {
        let failed = |code: FailureCode, error: String| CaptureOutcome::Failed {
            reason,
            code,
            error,
        };

        let Some(frame) = self.frames.frame(FrameVariant::Annotated) else {
            return failed(FailureCode::NoFrame, "no frame available".to_string());
        };
        let jpeg = match encode_jpeg(&frame) {
            Ok(jpeg) => jpeg,
            Err(e) => return failed(FailureCode::EncodeFailed, e.to_string()),
        };

        let now = Utc::now();
        let filename = capture_filename(&now);
        let local_path = dated_path(&self.capture_dir, &now, &filename);
        if let Err(e) = write_file(&local_path, &jpeg) {
            return failed(
                FailureCode::StoreFailed,
                format!("failed to write {}: {}", local_path.display(), e),
            );
        }

        let key = dated_key(&now, &filename);
        if !self.uploader.is_enabled() {
            return CaptureOutcome::Retained {
                reason,
                local_path: local_path.display().to_string(),
                error: "uploads disabled".to_string(),
            };
        }

        let result = retry_blocking(&self.retry, |_| {
            self.uploader.upload(&key, &jpeg, CONTENT_TYPE)
        });
        metrics::record_upload_attempts(result.attempts());

        match result {
            RetryResult::Success { value: url, attempts } => {
                if let Err(e) = std::fs::remove_file(&local_path) {
                    warn!(path = %local_path.display(), "Uploaded but could not remove local copy: {}", e);
                }
                info!(%reason, key = %key, attempts, "Capture uploaded");
                CaptureOutcome::Uploaded { reason, url, key }
            }
            RetryResult::Failed { error, attempts } => {
                warn!(
                    %reason,
                    path = %local_path.display(),
                    attempts,
                    "Upload failed, keeping local capture: {}",
                    error
                );
                CaptureOutcome::Retained {
                    reason,
                    local_path: local_path.display().to_string(),
                    error: error.to_string(),
                }
            }
        }
    }
}

/// `YYYYmmddTHHMMSSmmmZ.jpg`
pub fn capture_filename(ts: &DateTime<Utc>) -> String {
    format!("{}.jpg", ts.format("%Y%m%dT%H%M%S%3fZ"))
}

/// `root/YYYY/MM/DD/filename`
pub fn dated_path(root: &Path, ts: &DateTime<Utc>, filename: &str) -> PathBuf {
    root.join(ts.format("%Y").to_string())
        .join(ts.format("%m").to_string())
        .join(ts.format("%d").to_string())
        .join(filename)
}

fn write_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)
}
