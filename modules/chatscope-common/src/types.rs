use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Emotion labels produced by the classifier, in model output order.
pub const EMOTION_NAMES: [&str; 8] = [
    "喜び", "悲しみ", "期待", "驚き", "怒り", "恐れ", "嫌悪", "信頼",
];

// --- Platforms ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    YouTube,
    Twitch,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::YouTube => write!(f, "youtube"),
            Platform::Twitch => write!(f, "twitch"),
        }
    }
}

// --- Records ---

/// One chat utterance, positioned by its offset into the video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRecord {
    pub text: String,
    pub offset_seconds: u64,
    pub emotion: Option<String>,
}

impl ChatRecord {
    pub fn new(text: impl Into<String>, offset_seconds: u64) -> Self {
        Self {
            text: text.into(),
            offset_seconds,
            emotion: None,
        }
    }

    pub fn with_emotion(mut self, emotion: impl Into<String>) -> Self {
        self.emotion = Some(emotion.into());
        self
    }

    /// Whole minutes into the video. Always derived, never stored separately.
    pub fn minute(&self) -> u64 {
        self.offset_seconds / 60
    }
}

/// Descriptive fields written as the header of a persisted table.
///
/// Unknown header keys land in `extra` and are written back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_at: Option<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl RunMetadata {
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Metadata plus the ordered records of one transcript.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatTable {
    pub metadata: RunMetadata,
    pub records: Vec<ChatRecord>,
}

impl ChatTable {
    pub fn new(metadata: RunMetadata, records: Vec<ChatRecord>) -> Self {
        Self { metadata, records }
    }

    /// A table is labeled once any record carries an emotion.
    pub fn is_labeled(&self) -> bool {
        self.records.iter().any(|r| r.emotion.is_some())
    }

    pub fn texts(&self) -> Vec<String> {
        self.records.iter().map(|r| r.text.clone()).collect()
    }

    /// Attach one label per record, in order. Lengths must match.
    pub fn attach_labels(&mut self, labels: Vec<String>) -> Result<()> {
        if labels.len() != self.records.len() {
            return Err(PipelineError::Format(format!(
                "got {} labels for {} records",
                labels.len(),
                self.records.len()
            )));
        }
        for (record, label) in self.records.iter_mut().zip(labels) {
            record.emotion = Some(label);
        }
        Ok(())
    }
}
