// Twitch service: paginate VOD comments through the GQL client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use chatscope_common::{
    ChatRecord, ChatTable, PipelineError, Platform, ProgressSink, Result, RunMetadata,
};
use twitch_client::{CommentConnection, CommentEdge, PageRequest, TwitchClient, TwitchError};

use crate::router::SourceLocator;

/// One page of comments for a VOD.
#[async_trait]
pub trait CommentPager: Send + Sync {
    async fn comments_page(&self, video_id: &str, page: &PageRequest) -> Result<CommentConnection>;
}

#[async_trait]
impl CommentPager for TwitchClient {
    async fn comments_page(&self, video_id: &str, page: &PageRequest) -> Result<CommentConnection> {
        self.video_comments(video_id, page)
            .await
            .map_err(twitch_error)
    }
}

fn twitch_error(err: TwitchError) -> PipelineError {
    match err {
        TwitchError::Parse(_) => PipelineError::Format(err.to_string()),
        TwitchError::Network(_)
        | TwitchError::Timeout(_)
        | TwitchError::Api { .. }
        | TwitchError::GraphQl(_) => PipelineError::Network(err.to_string()),
    }
}

pub struct TwitchChatSource {
    pager: Arc<dyn CommentPager>,
    page_delay: Duration,
}

impl TwitchChatSource {
    pub fn new(pager: Arc<dyn CommentPager>, page_delay: Duration) -> Self {
        Self { pager, page_delay }
    }

    /// Walk every comment page of the VOD: offset 0 first, then cursors until
    /// the API reports no further page.
    pub async fn fetch(&self, locator: &SourceLocator, sink: &dyn ProgressSink) -> Result<ChatTable> {
        let video_id = locator.video_id.as_deref().ok_or_else(|| {
            PipelineError::Configuration(format!("no Twitch video id in {}", locator.url))
        })?;
        info!(video_id, "twitch: fetching comments");

        let mut request = PageRequest::Offset(0);
        let mut records = Vec::new();
        let mut pages = 0usize;

        loop {
            sink.checkpoint(&format!("Fetching comments (page {})", pages + 1))?;
            let page = self.pager.comments_page(video_id, &request).await?;
            pages += 1;

            let before = records.len();
            records.extend(page.edges.iter().filter_map(edge_record));
            debug!(video_id, page = pages, comments = records.len() - before, "twitch: page fetched");

            request = match page.next_cursor() {
                Some(cursor) => PageRequest::Cursor(cursor.to_string()),
                None if page.page_info.has_next_page => {
                    return Err(PipelineError::Format(format!(
                        "comment page {pages} reports more pages but carries no cursor"
                    )));
                }
                None => break,
            };

            if !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }
        }

        info!(video_id, pages, records = records.len(), "twitch: fetched comments");

        let mut metadata = RunMetadata::for_url(locator.canonical_url());
        metadata.video_id = Some(video_id.to_string());
        metadata
            .extra
            .insert("platform".into(), Value::from(Platform::Twitch.to_string()));

        Ok(ChatTable::new(metadata, records))
    }
}

/// Comments without text (emote-only, deleted) are dropped.
fn edge_record(edge: &CommentEdge) -> Option<ChatRecord> {
    let text = edge.text()?;
    let offset = edge.node.content_offset_seconds.max(0) as u64;
    Some(ChatRecord::new(text, offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Replays canned pages and records every request it saw.
    struct ScriptedPager {
        pages: Mutex<Vec<CommentConnection>>,
        requests: Mutex<Vec<PageRequest>>,
    }

    impl ScriptedPager {
        fn new(pages: Vec<serde_json::Value>) -> Self {
            let pages = pages
                .into_iter()
                .rev()
                .map(|p| serde_json::from_value(p).unwrap())
                .collect();
            Self {
                pages: Mutex::new(pages),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CommentPager for ScriptedPager {
        async fn comments_page(&self, _video_id: &str, page: &PageRequest) -> Result<CommentConnection> {
            self.requests.lock().unwrap().push(page.clone());
            self.pages
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| PipelineError::Network("no more scripted pages".into()))
        }
    }

    struct Recorder {
        steps: Mutex<Vec<String>>,
    }

    impl ProgressSink for Recorder {
        fn checkpoint(&self, step: &str) -> Result<()> {
            self.steps.lock().unwrap().push(step.to_string());
            Ok(())
        }
        fn progress(&self, _percent: u8) {}
    }

    fn locator() -> SourceLocator {
        SourceLocator {
            platform: Platform::Twitch,
            url: "https://twitch.tv/videos/42?t=1h".into(),
            video_id: Some("42".into()),
        }
    }

    fn edge(cursor: &str, offset: i64, text: Option<&str>) -> serde_json::Value {
        serde_json::json!({
            "cursor": cursor,
            "node": {
                "contentOffsetSeconds": offset,
                "message": {"fragments": [{"text": text}]}
            }
        })
    }

    #[tokio::test]
    async fn follows_cursor_until_last_page() {
        let pager = Arc::new(ScriptedPager::new(vec![
            serde_json::json!({
                "edges": [edge("c0", 5, Some("hi")), edge("c1", 65, Some("pog"))],
                "pageInfo": {"hasNextPage": true}
            }),
            serde_json::json!({
                "edges": [edge("c2", 130, Some("gg")), edge("c3", 131, None)],
                "pageInfo": {"hasNextPage": false}
            }),
        ]));
        let source = TwitchChatSource::new(pager.clone(), Duration::ZERO);
        let sink = Recorder { steps: Mutex::new(Vec::new()) };

        let table = source.fetch(&locator(), &sink).await.unwrap();

        assert_eq!(
            table.records,
            vec![
                ChatRecord::new("hi", 5),
                ChatRecord::new("pog", 65),
                ChatRecord::new("gg", 130),
            ]
        );
        assert_eq!(
            *pager.requests.lock().unwrap(),
            vec![PageRequest::Offset(0), PageRequest::Cursor("c1".into())]
        );
        assert_eq!(
            *sink.steps.lock().unwrap(),
            vec!["Fetching comments (page 1)", "Fetching comments (page 2)"]
        );
        assert_eq!(table.metadata.url, "https://www.twitch.tv/videos/42");
        assert_eq!(table.metadata.video_id.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn missing_cursor_with_more_pages_is_format_error() {
        let pager = Arc::new(ScriptedPager::new(vec![serde_json::json!({
            "edges": [{"node": {"contentOffsetSeconds": 1, "message": {"fragments": [{"text": "x"}]}}}],
            "pageInfo": {"hasNextPage": true}
        })]));
        let source = TwitchChatSource::new(pager, Duration::ZERO);
        let sink = Recorder { steps: Mutex::new(Vec::new()) };

        let err = source.fetch(&locator(), &sink).await.unwrap_err();
        assert!(matches!(err, PipelineError::Format(_)));
    }

    #[test]
    fn client_errors_map_to_pipeline_kinds() {
        assert!(matches!(
            twitch_error(TwitchError::Timeout("slow".into())),
            PipelineError::Network(_)
        ));
        assert!(matches!(
            twitch_error(TwitchError::GraphQl("video 1 not found".into())),
            PipelineError::Network(_)
        ));
        assert!(matches!(
            twitch_error(TwitchError::Parse("bad json".into())),
            PipelineError::Format(_)
        ));
    }
}
