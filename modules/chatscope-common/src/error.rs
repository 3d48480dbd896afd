use thiserror::Error;

/// Shown to the user instead of an error banner when a run is cancelled.
pub const CANCEL_MESSAGE: &str = "キャンセルされました";

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Bad or unsupported input. Raised before any network access.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Network(String),

    /// Malformed persisted table, raw transcript, or remote payload.
    #[error("Format error: {0}")]
    Format(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Run cancelled")]
    Cancelled,

    #[error(transparent)]
    Unknown(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
    }

    /// Short category name, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Configuration(_) => "configuration",
            PipelineError::Network(_) => "network",
            PipelineError::Format(_) => "format",
            PipelineError::Io(_) => "io",
            PipelineError::Cancelled => "cancelled",
            PipelineError::Unknown(_) => "unknown",
        }
    }

    /// Message for the user: the fixed phrase for cancellation, otherwise the
    /// error followed by its full source chain.
    pub fn user_message(&self) -> String {
        if self.is_cancelled() {
            return CANCEL_MESSAGE.to_string();
        }
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            message.push_str("\n  caused by: ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Format(err.to_string())
    }
}
