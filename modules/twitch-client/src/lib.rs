pub mod error;
pub mod types;

pub use error::{Result, TwitchError};
pub use types::{
    CommentConnection, CommentEdge, CommentMessage, CommentNode, MessageFragment, PageInfo,
    PageRequest,
};

use std::time::Duration;

use types::{CommentVariables, Extensions, GqlRequest, GqlResponse, PersistedQuery};

const GQL_URL: &str = "https://gql.twitch.tv/gql";

/// Client-Id used by the public twitch.tv web player.
pub const PUBLIC_CLIENT_ID: &str = "kimne78kx3ncx6brgo4mv6wki5h1ko";

const COMMENTS_OPERATION: &str = "VideoCommentsByOffsetOrCursor";

/// Persisted query hash for `VideoCommentsByOffsetOrCursor`.
const COMMENTS_QUERY_HASH: &str =
    "b70a3591ff0f4e0313d126c6a1502d79a1c02baebb288227c582044aa76adf6a";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct TwitchClient {
    client: reqwest::Client,
    client_id: String,
    base_url: String,
    timeout: Duration,
}

impl TwitchClient {
    pub fn new(client_id: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id,
            base_url: GQL_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Point the client at a different GraphQL endpoint (proxies, local fakes).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Per-request timeout. A request exceeding it fails with `TwitchError::Timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetch one page of comments for a VOD. Never retries.
    pub async fn video_comments(
        &self,
        video_id: &str,
        page: &PageRequest,
    ) -> Result<CommentConnection> {
        let body = GqlRequest {
            operation_name: COMMENTS_OPERATION,
            variables: CommentVariables::new(video_id, page),
            extensions: Extensions {
                persisted_query: PersistedQuery {
                    version: 1,
                    sha256_hash: COMMENTS_QUERY_HASH,
                },
            },
        };

        let resp = self
            .client
            .post(&self.base_url)
            .header("Client-Id", &self.client_id)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TwitchError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let text = resp.text().await?;
        let comments = parse_comments(video_id, &text)?;

        tracing::debug!(
            video_id,
            edges = comments.edges.len(),
            has_next_page = comments.page_info.has_next_page,
            "Fetched comment page"
        );

        Ok(comments)
    }
}

/// Decode a comments response body. GraphQL errors and a missing video are
/// errors; a video without a comment connection is an empty page.
fn parse_comments(video_id: &str, body: &str) -> Result<CommentConnection> {
    let gql: GqlResponse = serde_json::from_str(body)?;
    if let Some(first) = gql.errors.first() {
        return Err(TwitchError::GraphQl(first.message.clone()));
    }

    Ok(gql
        .data
        .and_then(|d| d.video)
        .ok_or_else(|| TwitchError::GraphQl(format!("video {video_id} not found")))?
        .comments
        .unwrap_or_default())
}
