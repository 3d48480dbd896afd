// YouTube service: replay chat via the downloader, then JSONL → ChatRecords.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use serde_json::Value;
use tracing::{debug, info, warn};

use chatscope_common::{ChatRecord, ChatTable, Platform, ProgressSink, Result, RunMetadata};

use crate::downloader::{ChatDownloader, DownloadProgress};
use crate::router::SourceLocator;

const STEP_DOWNLOAD: &str = "Downloading chat";
const STEP_CONVERT: &str = "Converting chat";

/// Where the message text sits inside one `replayChatItemAction`.
const TEXT_POINTER: &str =
    "/actions/0/addChatItemAction/item/liveChatTextMessageRenderer/message/runs/0/text";

pub struct YouTubeChatSource {
    downloader: Arc<dyn ChatDownloader>,
    work_dir: PathBuf,
    utc_offset: FixedOffset,
}

/// Records recovered from a raw replay-chat file.
#[derive(Debug, Default)]
pub struct ConvertedChat {
    pub records: Vec<ChatRecord>,
    /// Lines that were not valid JSON.
    pub malformed_lines: usize,
}

impl YouTubeChatSource {
    pub fn new(
        downloader: Arc<dyn ChatDownloader>,
        work_dir: impl Into<PathBuf>,
        utc_offset: FixedOffset,
    ) -> Self {
        Self {
            downloader,
            work_dir: work_dir.into(),
            utc_offset,
        }
    }

    pub async fn fetch(&self, locator: &SourceLocator, sink: &dyn ProgressSink) -> Result<ChatTable> {
        sink.checkpoint(STEP_DOWNLOAD)?;
        info!(url = %locator.url, "youtube: downloading replay chat");

        let hook = |progress: DownloadProgress| -> Result<()> {
            if let Some(percent) = progress.percent() {
                sink.progress(percent);
            }
            sink.checkpoint(STEP_DOWNLOAD)
        };
        let downloaded = self
            .downloader
            .download(&locator.url, &self.work_dir, &hook)
            .await?;

        // The raw artifact is removed whether or not conversion succeeds.
        let converted = sink
            .checkpoint(STEP_CONVERT)
            .and_then(|_| convert_live_chat_file(&downloaded.path));
        if let Err(e) = std::fs::remove_file(&downloaded.path) {
            warn!(path = %downloaded.path.display(), error = %e, "Failed to remove raw chat file");
        }
        let converted = converted?;

        let info = downloaded.info;
        info!(
            video_id = %info.id,
            records = converted.records.len(),
            malformed_lines = converted.malformed_lines,
            "youtube: converted replay chat"
        );

        let mut metadata = RunMetadata::for_url(
            SourceLocator {
                platform: Platform::YouTube,
                url: locator.url.clone(),
                video_id: Some(info.id.clone()),
            }
            .canonical_url(),
        );
        metadata.upload_at = info
            .upload_timestamp()
            .and_then(|ts| format_upload_time(ts, self.utc_offset));
        metadata.title = info.title;
        metadata.video_id = Some(info.id);
        metadata
            .extra
            .insert("platform".into(), Value::from(Platform::YouTube.to_string()));

        Ok(ChatTable::new(metadata, converted.records))
    }
}

pub fn convert_live_chat_file(path: &Path) -> Result<ConvertedChat> {
    let file = std::fs::File::open(path)?;
    parse_live_chat(std::io::BufReader::new(file))
}

/// Convert line-delimited replay-chat JSON into records, in file order.
///
/// Only plain text messages are kept. Blank lines and non-chat actions are
/// skipped silently; lines that are not JSON are skipped and counted.
pub fn parse_live_chat<R: BufRead>(reader: R) -> Result<ConvertedChat> {
    let mut converted = ConvertedChat::default();

    for (idx, line) in reader.split(b'\n').enumerate() {
        let line = line?;
        let trimmed = line.trim_ascii();
        if trimmed.is_empty() {
            continue;
        }

        let event: Value = match serde_json::from_slice(trimmed) {
            Ok(event) => event,
            Err(e) => {
                debug!(line = idx + 1, error = %e, "Skipping malformed chat line");
                converted.malformed_lines += 1;
                continue;
            }
        };

        if let Some(record) = chat_record(&event) {
            converted.records.push(record);
        }
    }

    if converted.malformed_lines > 0 {
        warn!(
            malformed_lines = converted.malformed_lines,
            "Skipped malformed lines in replay chat"
        );
    }
    Ok(converted)
}

fn chat_record(event: &Value) -> Option<ChatRecord> {
    let replay = event.get("replayChatItemAction")?;
    let text = replay.pointer(TEXT_POINTER)?.as_str()?;
    let offset_ms = match replay.get("videoOffsetTimeMsec")? {
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        Value::Number(n) => n.as_i64()?,
        _ => return None,
    };
    // Messages sent before the stream started carry negative offsets.
    let offset_seconds = (offset_ms.max(0) / 1000) as u64;
    Some(ChatRecord::new(text, offset_seconds))
}

/// Epoch seconds → "YYYY/MM/DD/HH:MM" at the given offset.
pub fn format_upload_time(epoch_seconds: i64, offset: FixedOffset) -> Option<String> {
    let utc = DateTime::from_timestamp(epoch_seconds, 0)?;
    Some(
        utc.with_timezone(&offset)
            .format("%Y/%m/%d/%H:%M")
            .to_string(),
    )
}
