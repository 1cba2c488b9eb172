//! Structured worker logging.
//!
//! Gives every worker tick the same contextual fields (`worker`, `tick`).

use tracing::{debug, info, warn, Span};

/// Tick-scoped logger for one perception worker.
#[derive(Debug, Clone)]
pub struct WorkerLogger {
    worker: &'static str,
    tick: u64,
}

impl WorkerLogger {
    pub fn new(worker: &'static str) -> Self {
        Self { worker, tick: 0 }
    }

    /// Advance to the next tick number.
    pub fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    pub fn worker(&self) -> &'static str {
        self.worker
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn log_start(&self, interval_secs: f64) {
        info!(worker = self.worker, interval_secs, "Worker started");
    }

    pub fn log_stop(&self) {
        info!(worker = self.worker, ticks = self.tick, "Worker stopped");
    }

    pub fn log_skip(&self, reason: &str) {
        debug!(worker = self.worker, tick = self.tick, "Tick skipped: {}", reason);
    }

    pub fn log_result(&self, message: &str) {
        debug!(worker = self.worker, tick = self.tick, "Tick result: {}", message);
    }

    pub fn log_warning(&self, message: &str) {
        warn!(worker = self.worker, tick = self.tick, "Tick warning: {}", message);
    }

    /// Span covering one tick.
    pub fn tick_span(&self) -> Span {
        tracing::info_span!("tick", worker = self.worker, tick = self.tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_counter_advances() {
        let mut logger = WorkerLogger::new("face");
        assert_eq!(logger.worker(), "face");
        assert_eq!(logger.tick(), 0);
        assert_eq!(logger.next_tick(), 1);
        assert_eq!(logger.next_tick(), 2);
    }
}
