// Batched classification with per-batch progress and cancellation.

use tracing::{debug, info};

use chatscope_common::{PipelineError, ProgressSink, Result};

use crate::traits::EmotionClassifier;

pub const STEP_CLASSIFY: &str = "Classifying emotions";

pub const DEFAULT_BATCH_SIZE: usize = 16;
pub const DEFAULT_TOKEN_SIZE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    pub batch_size: usize,
    /// Maximum tokens per input; longer texts are truncated.
    pub token_size: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            token_size: DEFAULT_TOKEN_SIZE,
        }
    }
}

impl BatchSettings {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(PipelineError::Configuration(
                "batch size must be at least 1".into(),
            ));
        }
        if self.token_size == 0 {
            return Err(PipelineError::Configuration(
                "token size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Classify `texts` in sequential batches of `settings.batch_size`.
///
/// Returns one label per text, in order. Progress after batch k of n is
/// `round(100 * k / n)`; cancellation is checked before every batch.
pub async fn classify_all(
    engine: &dyn EmotionClassifier,
    texts: &[String],
    settings: BatchSettings,
    sink: &dyn ProgressSink,
) -> Result<Vec<String>> {
    settings.validate()?;
    sink.checkpoint(STEP_CLASSIFY)?;

    if texts.is_empty() {
        sink.progress(100);
        return Ok(Vec::new());
    }

    let total_batches = texts.len().div_ceil(settings.batch_size);
    info!(
        texts = texts.len(),
        batches = total_batches,
        batch_size = settings.batch_size,
        token_size = settings.token_size,
        "Classifying chat"
    );

    let mut labels = Vec::with_capacity(texts.len());
    for (idx, batch) in texts.chunks(settings.batch_size).enumerate() {
        sink.checkpoint(STEP_CLASSIFY)?;

        let batch_labels = engine.classify_batch(batch, settings.token_size).await?;
        if batch_labels.len() != batch.len() {
            return Err(PipelineError::Format(format!(
                "classifier returned {} labels for a batch of {}",
                batch_labels.len(),
                batch.len()
            )));
        }
        labels.extend(batch_labels);

        let done = idx + 1;
        sink.progress(batch_percent(done, total_batches));
        debug!(batch = done, of = total_batches, "Batch classified");
    }

    Ok(labels)
}

/// `round(100 * done / total)`, halves rounding up.
fn batch_percent(done: usize, total: usize) -> u8 {
    ((200 * done + total) / (2 * total)).min(100) as u8
}
