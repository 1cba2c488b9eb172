//! Generic polling worker.
//!
//! One [`PerceptionWorker`] drives one [`Perception`] on a dedicated OS
//! thread:
//!
//! `Sleep(interval) -> gate -> tick -> publish -> Sleep ...`
//!
//! A closed gate skips the tick without touching the result slot. A tick
//! either publishes a [`TickResult`] (success or typed failure) or is
//! abandoned, which also leaves the slot alone. Stop is cooperative: the
//! signal wakes the sleep immediately but cannot interrupt a tick that is
//! blocked in an external call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{info, warn};
use vigil_models::{FailureCode, Outcome, TickResult};

use crate::logging::WorkerLogger;
use crate::metrics;

/// Wakeable stop flag shared between a loop and its owner.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: Mutex<bool>,
    cv: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        *self.stopped.lock() = true;
        self.cv.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.lock()
    }

    /// Sleep up to `timeout`, returning early on stop. Returns true when stopped.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stopped = self.stopped.lock();
        while !*stopped {
            if self.cv.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }
}

/// What one tick produced.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome<T> {
    /// Overwrite the result slot.
    Publish(TickResult<T>),
    /// Give up without a result (not enough input); the slot keeps its value.
    Abandoned(String),
}

impl<T> TickOutcome<T> {
    pub fn ok(result: T) -> Self {
        TickOutcome::Publish(TickResult::ok(result))
    }

    pub fn failed(code: FailureCode, message: impl Into<String>) -> Self {
        TickOutcome::Publish(TickResult::failed(code, message))
    }

    pub fn abandoned(reason: impl Into<String>) -> Self {
        TickOutcome::Abandoned(reason.into())
    }
}

/// One kind of periodic analysis.
pub trait Perception: Send + 'static {
    type Output: Clone + Send + Sync + 'static;

    fn name(&self) -> &'static str;

    fn interval(&self) -> Duration;

    /// Whether this tick should run at all.
    fn gate(&self) -> bool;

    /// Do the work. Failures must come back as published failures, not panics.
    fn tick(&mut self, stop: &StopSignal) -> TickOutcome<Self::Output>;
}

type Slot<T> = Arc<RwLock<Option<TickResult<T>>>>;

struct Running<P> {
    stop: Arc<StopSignal>,
    done: mpsc::Receiver<P>,
    handle: JoinHandle<()>,
}

struct State<P> {
    idle: Option<P>,
    running: Option<Running<P>>,
}

/// Thread-per-worker runner with a single overwritten result slot.
pub struct PerceptionWorker<P: Perception> {
    name: &'static str,
    grace: Duration,
    slot: Slot<P::Output>,
    alive: Arc<AtomicBool>,
    state: Mutex<State<P>>,
}

impl<P: Perception> PerceptionWorker<P> {
    pub fn new(perception: P, grace: Duration) -> Self {
        Self {
            name: perception.name(),
            grace,
            slot: Arc::new(RwLock::new(None)),
            alive: Arc::new(AtomicBool::new(false)),
            state: Mutex::new(State {
                idle: Some(perception),
                running: None,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Start the loop. No-op when already running; returns whether a thread was spawned.
    pub fn start(&self) -> bool {
        let mut state = self.state.lock();
        if state.running.is_some() {
            return false;
        }
        let Some(perception) = state.idle.take() else {
            warn!(worker = self.name, "Worker cannot restart: previous loop never exited");
            return false;
        };

        let stop = Arc::new(StopSignal::new());
        let (tx, rx) = mpsc::channel();
        let slot = Arc::clone(&self.slot);
        let alive = Arc::clone(&self.alive);
        let loop_stop = Arc::clone(&stop);
        alive.store(true, Ordering::SeqCst);

        let spawned = thread::Builder::new()
            .name(format!("vigil-{}", self.name))
            .spawn(move || {
                let perception = run_loop(perception, &loop_stop, &slot);
                alive.store(false, Ordering::SeqCst);
                let _ = tx.send(perception);
            });

        match spawned {
            Ok(handle) => {
                state.running = Some(Running {
                    stop,
                    done: rx,
                    handle,
                });
                true
            }
            Err(e) => {
                self.alive.store(false, Ordering::SeqCst);
                warn!(worker = self.name, "Failed to spawn worker thread: {}", e);
                false
            }
        }
    }

    /// Signal the loop and wait up to the grace period for it to exit.
    ///
    /// Returns false if the loop was still busy when the grace period ran
    /// out; that thread is then left to finish on its own.
    pub fn stop(&self) -> bool {
        let mut state = self.state.lock();
        let Some(running) = state.running.take() else {
            return true;
        };
        running.stop.stop();

        match running.done.recv_timeout(self.grace) {
            Ok(perception) => {
                let _ = running.handle.join();
                state.idle = Some(perception);
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    worker = self.name,
                    grace_secs = self.grace.as_secs_f64(),
                    "Worker did not stop within grace period"
                );
                false
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = running.handle.join();
                warn!(worker = self.name, "Worker thread exited abnormally");
                false
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Copy of the last published result.
    pub fn last(&self) -> Option<TickResult<P::Output>> {
        self.slot.read().clone()
    }
}

fn run_loop<P: Perception>(
    mut perception: P,
    stop: &StopSignal,
    slot: &Slot<P::Output>,
) -> P {
    let name = perception.name();
    let mut log = WorkerLogger::new(name);
    log.log_start(perception.interval().as_secs_f64());
    metrics::worker_started(name);

    while !stop.wait_timeout(perception.interval()) {
        log.next_tick();
        if !perception.gate() {
            log.log_skip("gate closed");
            metrics::record_tick(name, "skipped");
            continue;
        }

        let span = log.tick_span();
        let _enter = span.enter();
        let started = Instant::now();
        let outcome = perception.tick(stop);
        metrics::record_inference_duration(name, started.elapsed().as_secs_f64());

        match outcome {
            TickOutcome::Publish(result) => {
                match &result.outcome {
                    Outcome::Ok { .. } => {
                        log.log_result("ok");
                        metrics::record_tick(name, "ok");
                    }
                    Outcome::Failed { code, message } => {
                        let line = format!("{}: {}", code, message);
                        match code {
                            FailureCode::NoFrame | FailureCode::NoFace | FailureCode::NoResults => {
                                log.log_result(&line)
                            }
                            _ => log.log_warning(&line),
                        }
                        metrics::record_tick(name, "failed");
                    }
                }
                *slot.write() = Some(result);
            }
            TickOutcome::Abandoned(reason) => {
                log.log_skip(&reason);
                metrics::record_tick(name, "abandoned");
            }
        }
    }

    metrics::worker_stopped(name);
    log.log_stop();
    info!(worker = name, "Worker loop exited");
    perception
}
