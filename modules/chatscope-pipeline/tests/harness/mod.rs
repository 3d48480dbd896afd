//! In-process fakes for pipeline integration tests.
//!
//! Fakes the *data sources* (downloader, comment pager) and the classifier.
//! No network, no child processes; tables go to a temp dir.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::FixedOffset;
use tempfile::TempDir;

use chatscope_archive::{
    live_chat_path, ChatArchive, ChatDownloader, CommentPager, DownloadProgress, DownloadedChat,
    ProgressHook, TwitchChatSource, VideoInfo, YouTubeChatSource,
};
use chatscope_common::{PipelineError, Result, EMOTION_NAMES};
use chatscope_pipeline::{CancelHandle, EmotionClassifier, Orchestrator, ResultStore};
use twitch_client::{CommentConnection, PageRequest};

pub const VIDEO_ID: &str = "dQw4w9WgXcQ";
pub const YOUTUBE_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";
pub const TWITCH_URL: &str = "https://www.twitch.tv/videos/2071234567";

// ---------------------------------------------------------------------------
// Replay chat fixtures
// ---------------------------------------------------------------------------

pub fn text_event(text: &str, offset_ms: i64) -> String {
    serde_json::json!({
        "replayChatItemAction": {
            "actions": [{
                "addChatItemAction": {
                    "item": {
                        "liveChatTextMessageRenderer": {
                            "message": {"runs": [{"text": text}]}
                        }
                    }
                }
            }],
            "videoOffsetTimeMsec": offset_ms.to_string()
        }
    })
    .to_string()
}

/// Four chat messages plus one truncated line.
pub fn sample_live_chat() -> String {
    [
        text_event("こんばんは", 1_000),
        text_event("待ってた", 59_999),
        "{\"replayChatItemAction\": {\"actions\": [".to_string(),
        text_event("\"神回\", 確定", 60_000),
        text_event("C:\\path\\ok", 125_500),
    ]
    .join("\n")
}

// ---------------------------------------------------------------------------
// MockDownloader
// ---------------------------------------------------------------------------

pub struct MockDownloader {
    content: String,
    calls: AtomicUsize,
    /// Requested just before the download would finish.
    cancel_during: Mutex<Option<CancelHandle>>,
}

impl MockDownloader {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            calls: AtomicUsize::new(0),
            cancel_during: Mutex::new(None),
        }
    }

    pub fn cancelling(self, cancel: CancelHandle) -> Self {
        *self.cancel_during.lock().unwrap() = Some(cancel);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatDownloader for MockDownloader {
    async fn download(
        &self,
        _url: &str,
        work_dir: &Path,
        on_progress: ProgressHook<'_>,
    ) -> Result<DownloadedChat> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        on_progress(DownloadProgress {
            fragment_index: Some(1),
            fragment_count: Some(2),
            downloaded_bytes: Some(512),
        })?;
        if let Some(cancel) = self.cancel_during.lock().unwrap().as_ref() {
            cancel.cancel();
        }
        on_progress(DownloadProgress {
            fragment_index: Some(2),
            fragment_count: Some(2),
            downloaded_bytes: Some(1024),
        })?;

        let path = live_chat_path(work_dir, VIDEO_ID);
        std::fs::write(&path, &self.content)?;

        Ok(DownloadedChat {
            info: VideoInfo {
                id: VIDEO_ID.to_string(),
                title: Some("雑談配信".to_string()),
                // 2024-05-01T12:00:00Z
                timestamp: Some(1_714_564_800),
                release_timestamp: None,
            },
            path,
        })
    }
}

// ---------------------------------------------------------------------------
// ScriptedPager
// ---------------------------------------------------------------------------

pub struct ScriptedPager {
    pages: Mutex<Vec<CommentConnection>>,
    pub requests: Mutex<Vec<PageRequest>>,
    /// Requested while the final page is being served.
    cancel_on_last: Mutex<Option<CancelHandle>>,
}

impl ScriptedPager {
    pub fn new(pages: Vec<serde_json::Value>) -> Self {
        let pages = pages
            .into_iter()
            .rev()
            .map(|p| serde_json::from_value(p).expect("invalid page fixture"))
            .collect();
        Self {
            pages: Mutex::new(pages),
            requests: Mutex::new(Vec::new()),
            cancel_on_last: Mutex::new(None),
        }
    }

    pub fn cancelling_on_last_page(self, cancel: CancelHandle) -> Self {
        *self.cancel_on_last.lock().unwrap() = Some(cancel);
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CommentPager for ScriptedPager {
    async fn comments_page(&self, _video_id: &str, page: &PageRequest) -> Result<CommentConnection> {
        self.requests.lock().unwrap().push(page.clone());
        let mut pages = self.pages.lock().unwrap();
        let next = pages
            .pop()
            .ok_or_else(|| PipelineError::Network("no more scripted pages".into()))?;
        if pages.is_empty() {
            if let Some(cancel) = self.cancel_on_last.lock().unwrap().as_ref() {
                cancel.cancel();
            }
        }
        Ok(next)
    }
}

pub fn twitch_page(comments: &[(&str, i64, &str)], has_next_page: bool) -> serde_json::Value {
    let edges: Vec<_> = comments
        .iter()
        .map(|(cursor, offset, text)| {
            serde_json::json!({
                "cursor": cursor,
                "node": {
                    "contentOffsetSeconds": offset,
                    "message": {"fragments": [{"text": text}]}
                }
            })
        })
        .collect();
    serde_json::json!({"edges": edges, "pageInfo": {"hasNextPage": has_next_page}})
}

// ---------------------------------------------------------------------------
// FixedClassifier
// ---------------------------------------------------------------------------

/// Labels each text by its character count, so results are predictable.
pub struct FixedClassifier {
    pub batches: Mutex<Vec<usize>>,
    /// Cancel once this many batches have been classified.
    cancel_after: Mutex<Option<(usize, CancelHandle)>>,
}

impl FixedClassifier {
    pub fn new() -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            cancel_after: Mutex::new(None),
        }
    }

    pub fn cancelling_after(self, batches: usize, cancel: CancelHandle) -> Self {
        *self.cancel_after.lock().unwrap() = Some((batches, cancel));
        self
    }

    pub fn label_for(text: &str) -> &'static str {
        EMOTION_NAMES[text.chars().count() % EMOTION_NAMES.len()]
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmotionClassifier for FixedClassifier {
    async fn classify_batch(&self, texts: &[String], _max_tokens: usize) -> Result<Vec<String>> {
        let done = {
            let mut batches = self.batches.lock().unwrap();
            batches.push(texts.len());
            batches.len()
        };
        if let Some((limit, cancel)) = self.cancel_after.lock().unwrap().as_ref() {
            if done >= *limit {
                cancel.cancel();
            }
        }
        Ok(texts.iter().map(|t| Self::label_for(t).to_string()).collect())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub dir: TempDir,
    pub downloader: Arc<MockDownloader>,
    pub pager: Arc<ScriptedPager>,
    pub classifier: Arc<FixedClassifier>,
    pub orchestrator: Arc<Orchestrator>,
}

impl Harness {
    pub fn new(downloader: MockDownloader, pager: ScriptedPager, classifier: FixedClassifier) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let downloader = Arc::new(downloader);
        let pager = Arc::new(pager);
        let classifier = Arc::new(classifier);

        let jst = FixedOffset::east_opt(9 * 3600).unwrap();
        let archive = ChatArchive::with_sources(
            YouTubeChatSource::new(downloader.clone(), dir.path(), jst),
            TwitchChatSource::new(pager.clone(), Duration::ZERO),
        );
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::new(archive),
            Some(classifier.clone() as Arc<dyn EmotionClassifier>),
            Arc::new(ResultStore::new()),
        ));

        Self {
            dir,
            downloader,
            pager,
            classifier,
            orchestrator,
        }
    }

    pub fn youtube(content: impl Into<String>) -> Self {
        Self::new(
            MockDownloader::new(content),
            ScriptedPager::new(vec![]),
            FixedClassifier::new(),
        )
    }

    pub fn output(&self) -> PathBuf {
        self.dir.path().join("chat.csv")
    }
}
