// Run lifecycle: cancellation flag, step/progress events, terminal outcome.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::info;

use chatscope_common::{PipelineError, ProgressSink, Result};

/// Cooperative cancellation flag shared between a run and whoever started it.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Cancelled,
    /// User-facing message, including the error chain.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    Step(String),
    Progress(u8),
    Finished(Outcome),
}

#[derive(Debug)]
struct JobState {
    phase: Phase,
    current_step: Option<String>,
    progress: Option<u8>,
}

/// Owns the state of one invocation and publishes its events.
///
/// Events go out over an unbounded channel in the order they happen. Step
/// events fire only when the step label changes; progress is clamped
/// non-decreasing within a step and never repeats a value.
pub struct JobController {
    cancel: CancelHandle,
    events: mpsc::UnboundedSender<JobEvent>,
    state: Mutex<JobState>,
}

impl JobController {
    pub fn new(cancel: CancelHandle) -> (Self, mpsc::UnboundedReceiver<JobEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let controller = Self {
            cancel,
            events,
            state: Mutex::new(JobState {
                phase: Phase::Idle,
                current_step: None,
                progress: None,
            }),
        };
        (controller, rx)
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn phase(&self) -> Phase {
        self.state().phase
    }

    pub fn current_step(&self) -> Option<String> {
        self.state().current_step.clone()
    }

    pub fn start(&self) {
        self.state().phase = Phase::Running;
    }

    /// Move to a terminal phase and emit the final events.
    pub fn finish(&self, error: Option<&PipelineError>) -> Outcome {
        let outcome = match error {
            None => {
                self.progress(100);
                Outcome::Completed
            }
            Some(PipelineError::Cancelled) => Outcome::Cancelled,
            Some(e) => Outcome::Failed(e.user_message()),
        };

        self.state().phase = match outcome {
            Outcome::Completed => Phase::Completed,
            Outcome::Cancelled => Phase::Cancelled,
            Outcome::Failed(_) => Phase::Failed,
        };
        self.emit(JobEvent::Finished(outcome.clone()));
        outcome
    }

    /// Announce `step` without observing cancellation. Used for work that
    /// must finish once started, such as persisting a fetched table.
    pub fn enter_step(&self, step: &str) {
        let mut state = self.state();
        if state.current_step.as_deref() == Some(step) {
            return;
        }
        state.current_step = Some(step.to_string());
        state.progress = None;
        drop(state);
        info!(step, "Step");
        self.emit(JobEvent::Step(step.to_string()));
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            info!("Run cancelled by user");
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }

    fn emit(&self, event: JobEvent) {
        // A dropped receiver just means nobody is watching.
        let _ = self.events.send(event);
    }

    fn state(&self) -> MutexGuard<'_, JobState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ProgressSink for JobController {
    fn checkpoint(&self, step: &str) -> Result<()> {
        self.enter_step(step);
        self.check_cancelled()
    }

    fn progress(&self, percent: u8) {
        let percent = percent.min(100);
        let mut state = self.state();
        if state.progress.is_some_and(|last| percent <= last) {
            return;
        }
        state.progress = Some(percent);
        drop(state);
        self.emit(JobEvent::Progress(percent));
    }
}
