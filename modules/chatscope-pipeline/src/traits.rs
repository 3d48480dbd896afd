use async_trait::async_trait;

use chatscope_common::{Result, EMOTION_NAMES};

// ---------------------------------------------------------------------------
// EmotionClassifier: the inference engine behind batched classification
// ---------------------------------------------------------------------------

/// Labels a batch of utterances with emotion names.
///
/// Implementations return exactly one label per input, in input order. The
/// batched runner in `classify` rejects anything else.
#[async_trait]
pub trait EmotionClassifier: Send + Sync {
    /// The label set this engine produces.
    fn labels(&self) -> &[&'static str] {
        &EMOTION_NAMES
    }

    /// Classify one batch. Inputs longer than `max_tokens` are truncated by
    /// the engine.
    async fn classify_batch(&self, texts: &[String], max_tokens: usize) -> Result<Vec<String>>;
}
