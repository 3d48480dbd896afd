use crate::error::Result;

/// Receives pause points and progress from long-running fetch and
/// classification work.
///
/// `checkpoint` is the only place cancellation is observed: it returns
/// `Err(PipelineError::Cancelled)` once a cancel was requested, and callers
/// propagate it with `?`.
pub trait ProgressSink: Send + Sync {
    fn checkpoint(&self, step: &str) -> Result<()>;

    /// Percent complete (0..=100) for the current step. Best effort.
    fn progress(&self, percent: u8);
}
