//! Retry utilities with exponential backoff.
//!
//! Blocking counterparts of the usual async helpers: every caller here
//! already owns a dedicated thread.

use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay after the first failure (doubles each attempt).
    pub base_delay: Duration,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
    /// Operation name for logging.
    pub operation_name: String,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
            operation_name: "operation".to_string(),
        }
    }
}

impl RetryConfig {
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            ..Default::default()
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Delay after the `failures`-th consecutive failure (1-based).
    pub fn delay_after(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(31);
        let delay = self.base_delay.saturating_mul(2u32.saturating_pow(exp));
        delay.min(self.max_delay)
    }
}

/// Result of a retry operation.
#[derive(Debug)]
pub enum RetryResult<T, E> {
    Success { value: T, attempts: u32 },
    /// Operation failed after all attempts were used.
    Failed { error: E, attempts: u32 },
}

impl<T, E> RetryResult<T, E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryResult::Success { attempts, .. } | RetryResult::Failed { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// Run `operation` until it succeeds or `max_attempts` are used, sleeping
/// the backoff delay on the current thread between attempts.
pub fn retry_blocking<F, T, E>(config: &RetryConfig, mut operation: F) -> RetryResult<T, E>
where
    F: FnMut(u32) -> Result<T, E>,
    E: std::fmt::Display,
{
    let mut attempt = 1u32;
    loop {
        match operation(attempt) {
            Ok(value) => {
                return RetryResult::Success {
                    value,
                    attempts: attempt,
                }
            }
            Err(e) if attempt < config.max_attempts => {
                let delay = config.delay_after(attempt);
                debug!(
                    "{} attempt {} failed, retrying in {:?}: {}",
                    config.operation_name, attempt, delay, e
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => {
                return RetryResult::Failed {
                    error: e,
                    attempts: attempt,
                }
            }
        }
    }
}

/// Log suppression for loops that may fail the same way many times in a row.
#[derive(Debug, Default)]
pub struct FailureTracker {
    consecutive_failures: u32,
    max_logged_failures: u32,
    suppressed: bool,
}

impl FailureTracker {
    pub fn new(max_logged_failures: u32) -> Self {
        Self {
            consecutive_failures: 0,
            max_logged_failures,
            suppressed: false,
        }
    }

    /// Record a successful operation (resets failure count).
    pub fn record_success(&mut self, what: &str) {
        if self.consecutive_failures > 0 && self.suppressed {
            info!(
                "{} recovered after {} consecutive failures",
                what, self.consecutive_failures
            );
        }
        self.consecutive_failures = 0;
        self.suppressed = false;
    }

    /// Record a failed operation.
    ///
    /// Returns `true` if this failure should be logged (not suppressed).
    pub fn record_failure(&mut self, what: &str) -> bool {
        self.consecutive_failures += 1;

        if self.consecutive_failures <= self.max_logged_failures {
            true
        } else if self.consecutive_failures == self.max_logged_failures + 1 {
            self.suppressed = true;
            warn!(
                "Suppressing further {} failure logs after {} consecutive failures",
                what, self.max_logged_failures
            );
            false
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_backoff_schedule() {
        let config = RetryConfig::new("upload");
        assert_eq!(config.delay_after(1), Duration::from_secs(1));
        assert_eq!(config.delay_after(2), Duration::from_secs(2));
        assert_eq!(config.delay_after(3), Duration::from_secs(4));
        assert_eq!(config.delay_after(4), Duration::from_secs(8));
        assert_eq!(config.delay_after(20), Duration::from_secs(8));
    }

    #[test]
    fn test_retry_stops_at_max_attempts() {
        let config = RetryConfig::new("test").with_base_delay(Duration::ZERO);
        let mut calls = 0;
        let result: RetryResult<(), String> = retry_blocking(&config, |_| {
            calls += 1;
            Err("down".to_string())
        });
        assert!(matches!(result, RetryResult::Failed { attempts: 4, .. }));
        assert_eq!(calls, 4);
    }

    #[test]
    fn test_retry_eventual_success() {
        let config = RetryConfig::new("test").with_base_delay(Duration::from_millis(1));
        let result = retry_blocking(&config, |attempt| {
            if attempt < 3 {
                Err("transient")
            } else {
                Ok(attempt * 10)
            }
        });
        assert_eq!(result.attempts(), 3);
        assert!(matches!(result, RetryResult::Success { value: 30, .. }));
    }

    #[test]
    fn test_failure_tracker_suppression() {
        let mut tracker = FailureTracker::new(2);
        assert!(tracker.record_failure("camera read"));
        assert!(tracker.record_failure("camera read"));
        assert!(!tracker.record_failure("camera read"));
        assert!(!tracker.record_failure("camera read"));

        tracker.record_success("camera read");
        assert!(tracker.record_failure("camera read"));
        assert!(tracker.record_failure("camera read"));
    }
}
