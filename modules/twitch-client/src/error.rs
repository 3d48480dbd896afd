use thiserror::Error;

pub type Result<T> = std::result::Result<T, TwitchError>;

#[derive(Debug, Error)]
pub enum TwitchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("GraphQL error: {0}")]
    GraphQl(String),
}

impl From<reqwest::Error> for TwitchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TwitchError::Timeout(err.to_string())
        } else if err.is_decode() {
            TwitchError::Parse(err.to_string())
        } else {
            TwitchError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for TwitchError {
    fn from(err: serde_json::Error) -> Self {
        TwitchError::Parse(err.to_string())
    }
}
