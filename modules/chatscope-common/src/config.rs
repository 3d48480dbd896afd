use std::env;
use std::path::PathBuf;
use std::time::Duration;

use chrono::FixedOffset;

use crate::error::{PipelineError, Result};

/// Application configuration loaded from environment variables.
/// Per-run inputs (URL, output path, batch sizes) come from the CLI instead.
#[derive(Debug, Clone)]
pub struct Config {
    // YouTube
    pub yt_dlp_path: String,
    pub work_dir: PathBuf,

    // Twitch
    pub twitch_client_id: String,
    pub twitch_page_delay: Duration,

    // Network
    pub http_timeout: Duration,

    // Upload timestamps are rendered in this zone
    pub utc_offset: FixedOffset,

    // Classifier
    pub classifier_url: Option<String>,
    pub classifier_api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            yt_dlp_path: "yt-dlp".to_string(),
            work_dir: env::temp_dir(),
            twitch_client_id: "kimne78kx3ncx6brgo4mv6wki5h1ko".to_string(),
            twitch_page_delay: Duration::from_millis(100),
            http_timeout: Duration::from_secs(30),
            utc_offset: FixedOffset::east_opt(9 * 3600).expect("+09:00 is a valid offset"),
            classifier_url: None,
            classifier_api_key: None,
        }
    }
}

impl Config {
    /// Load configuration from the environment (and `.env`, if present).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let utc_offset_hours: i32 = parse_env("CHATSCOPE_UTC_OFFSET_HOURS", 9)?;

        let config = Self {
            yt_dlp_path: env::var("YT_DLP_PATH").unwrap_or(defaults.yt_dlp_path),
            work_dir: env::var("CHATSCOPE_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            twitch_client_id: env::var("TWITCH_CLIENT_ID").unwrap_or(defaults.twitch_client_id),
            twitch_page_delay: Duration::from_millis(parse_env("TWITCH_PAGE_DELAY_MS", 100)?),
            http_timeout: Duration::from_secs(parse_env("HTTP_TIMEOUT_SECS", 30)?),
            utc_offset: utc_offset(utc_offset_hours)?,
            classifier_url: env::var("CLASSIFIER_URL").ok().filter(|s| !s.is_empty()),
            classifier_api_key: env::var("CLASSIFIER_API_KEY").ok().filter(|s| !s.is_empty()),
        };

        Ok(config)
    }

    pub fn log_keys(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  YT_DLP_PATH: {}", self.yt_dlp_path);
        tracing::info!("  CHATSCOPE_WORK_DIR: {}", self.work_dir.display());
        tracing::info!("  TWITCH_PAGE_DELAY_MS: {}", self.twitch_page_delay.as_millis());
        tracing::info!("  HTTP_TIMEOUT_SECS: {}", self.http_timeout.as_secs());
        tracing::info!("  CHATSCOPE_UTC_OFFSET: {}", self.utc_offset);
        tracing::info!(
            "  CLASSIFIER_URL: {}",
            self.classifier_url.as_deref().unwrap_or("<not set>")
        );
        tracing::info!("  CLASSIFIER_API_KEY: {}", preview_opt(&self.classifier_api_key));
    }
}

/// First few characters of a secret, for startup logs.
fn preview_opt(val: &Option<String>) -> String {
    match val {
        Some(v) if !v.is_empty() => {
            let shown: String = v.chars().take(5).collect();
            format!("{}...({} chars)", shown, v.chars().count())
        }
        _ => "<not set>".to_string(),
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|_| {
            PipelineError::Configuration(format!("{key} must be a number, got {raw:?}"))
        }),
        _ => Ok(default),
    }
}

/// Build a fixed offset from whole hours east of UTC.
pub fn utc_offset(hours: i32) -> Result<FixedOffset> {
    hours.checked_mul(3600).and_then(FixedOffset::east_opt).ok_or_else(|| {
        PipelineError::Configuration(format!("UTC offset out of range: {hours} hours"))
    })
}
