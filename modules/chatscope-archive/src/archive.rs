use std::sync::Arc;

use tracing::info;

use chatscope_common::{ChatTable, Config, Platform, ProgressSink, Result};
use twitch_client::TwitchClient;

use crate::downloader::YtDlpDownloader;
use crate::router::{self, SourceLocator};
use crate::services::twitch::TwitchChatSource;
use crate::services::youtube::YouTubeChatSource;

/// The archive: resolve a URL to a platform and pull its chat transcript.
/// Use `archive.source(url)` to get a handle, then call `chat()` on it.
pub struct ChatArchive {
    youtube: YouTubeChatSource,
    twitch: TwitchChatSource,
}

impl ChatArchive {
    pub fn new(config: &Config) -> Self {
        let downloader = YtDlpDownloader::new(config.yt_dlp_path.clone(), config.http_timeout);
        let youtube =
            YouTubeChatSource::new(Arc::new(downloader), config.work_dir.clone(), config.utc_offset);

        let client =
            TwitchClient::new(config.twitch_client_id.clone()).with_timeout(config.http_timeout);
        let twitch = TwitchChatSource::new(Arc::new(client), config.twitch_page_delay);

        Self { youtube, twitch }
    }

    /// Build from already-constructed sources (tests inject fakes here).
    pub fn with_sources(youtube: YouTubeChatSource, twitch: TwitchChatSource) -> Self {
        Self { youtube, twitch }
    }

    /// Resolve a URL into a handle. Pure: no network access happens here.
    pub fn source(&self, url: &str) -> Result<SourceHandle<'_>> {
        let locator = router::resolve(url)?;
        info!(platform = %locator.platform, url = %locator.url, "Resolved chat source");
        Ok(SourceHandle {
            locator,
            archive: self,
        })
    }

    /// Shorthand for `source(url)?.chat(sink)`.
    pub async fn chat(&self, url: &str, sink: &dyn ProgressSink) -> Result<ChatTable> {
        self.source(url)?.chat(sink).await
    }
}

/// A resolved source bound to the archive that can fetch it.
pub struct SourceHandle<'a> {
    pub locator: SourceLocator,
    archive: &'a ChatArchive,
}

impl SourceHandle<'_> {
    pub fn platform(&self) -> Platform {
        self.locator.platform
    }

    pub async fn chat(&self, sink: &dyn ProgressSink) -> Result<ChatTable> {
        match self.locator.platform {
            Platform::YouTube => self.archive.youtube.fetch(&self.locator, sink).await,
            Platform::Twitch => self.archive.twitch.fetch(&self.locator, sink).await,
        }
    }
}
