use serde::{Deserialize, Serialize};

// --- Request types ---

/// Where a comment page starts: an absolute offset into the VOD, or the
/// continuation cursor handed back by the previous page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRequest {
    Offset(u64),
    Cursor(String),
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct GqlRequest<'a> {
    #[serde(rename = "operationName")]
    pub operation_name: &'static str,
    pub variables: CommentVariables<'a>,
    pub extensions: Extensions,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CommentVariables<'a> {
    #[serde(rename = "videoID")]
    pub video_id: &'a str,
    #[serde(
        rename = "contentOffsetSeconds",
        skip_serializing_if = "Option::is_none"
    )]
    pub content_offset_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct Extensions {
    #[serde(rename = "persistedQuery")]
    pub persisted_query: PersistedQuery,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct PersistedQuery {
    pub version: u32,
    #[serde(rename = "sha256Hash")]
    pub sha256_hash: &'static str,
}

impl<'a> CommentVariables<'a> {
    pub(crate) fn new(video_id: &'a str, page: &'a PageRequest) -> Self {
        match page {
            PageRequest::Offset(seconds) => Self {
                video_id,
                content_offset_seconds: Some(*seconds),
                cursor: None,
            },
            PageRequest::Cursor(cursor) => Self {
                video_id,
                content_offset_seconds: None,
                cursor: Some(cursor.as_str()),
            },
        }
    }
}

// --- Response types ---

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GqlResponse {
    pub data: Option<VideoData>,
    #[serde(default)]
    pub errors: Vec<GqlErrorEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GqlErrorEntry {
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct VideoData {
    pub video: Option<Video>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Video {
    pub comments: Option<CommentConnection>,
}

/// One page of VOD comments.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommentConnection {
    #[serde(default)]
    pub edges: Vec<CommentEdge>,
    #[serde(rename = "pageInfo", default)]
    pub page_info: PageInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentEdge {
    pub cursor: Option<String>,
    pub node: CommentNode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentNode {
    #[serde(rename = "contentOffsetSeconds")]
    pub content_offset_seconds: i64,
    pub message: Option<CommentMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentMessage {
    #[serde(default)]
    pub fragments: Vec<MessageFragment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageFragment {
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageInfo {
    #[serde(rename = "hasNextPage", default)]
    pub has_next_page: bool,
}

impl CommentEdge {
    /// Text of the first message fragment. Emote-only or empty messages yield None.
    pub fn text(&self) -> Option<&str> {
        self.node
            .message
            .as_ref()?
            .fragments
            .first()?
            .text
            .as_deref()
    }
}

impl CommentConnection {
    /// Cursor for the next page, if the API says there is one.
    pub fn next_cursor(&self) -> Option<&str> {
        if !self.page_info.has_next_page {
            return None;
        }
        self.edges.last()?.cursor.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_variables_omit_cursor() {
        let page = PageRequest::Offset(0);
        let vars = CommentVariables::new("123", &page);
        let json = serde_json::to_value(&vars).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"videoID": "123", "contentOffsetSeconds": 0})
        );
    }

    #[test]
    fn cursor_variables_omit_offset() {
        let page = PageRequest::Cursor("abc".into());
        let vars = CommentVariables::new("123", &page);
        let json = serde_json::to_value(&vars).unwrap();
        assert_eq!(json, serde_json::json!({"videoID": "123", "cursor": "abc"}));
    }

    #[test]
    fn parses_comment_page() {
        let body = r#"{
            "data": {"video": {"comments": {
                "edges": [
                    {"cursor": "c0", "node": {"contentOffsetSeconds": 3,
                        "message": {"fragments": [{"text": "hello"}, {"text": " world"}]}}},
                    {"cursor": "c1", "node": {"contentOffsetSeconds": 65,
                        "message": {"fragments": [{"text": "gg"}]}}}
                ],
                "pageInfo": {"hasNextPage": true}
            }}}
        }"#;
        let resp: GqlResponse = serde_json::from_str(body).unwrap();
        let page = resp.data.unwrap().video.unwrap().comments.unwrap();
        assert_eq!(page.edges.len(), 2);
        assert_eq!(page.edges[0].text(), Some("hello"));
        assert_eq!(page.edges[1].node.content_offset_seconds, 65);
        assert_eq!(page.next_cursor(), Some("c1"));
    }

    #[test]
    fn last_page_has_no_cursor() {
        let page = CommentConnection {
            edges: vec![],
            page_info: PageInfo {
                has_next_page: false,
            },
        };
        assert_eq!(page.next_cursor(), None);
    }

    #[test]
    fn emote_only_fragment_has_no_text() {
        let edge: CommentEdge = serde_json::from_str(
            r#"{"cursor": null, "node": {"contentOffsetSeconds": 1,
                "message": {"fragments": [{"text": null}]}}}"#,
        )
        .unwrap();
        assert_eq!(edge.text(), None);
    }
}
