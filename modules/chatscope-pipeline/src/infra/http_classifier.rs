use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use chatscope_common::{Config, PipelineError, Result, EMOTION_NAMES};

use crate::traits::EmotionClassifier;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Emotion classifier served by a text-classification inference endpoint.
///
/// The endpoint receives `{inputs, max_length, truncation}` and answers with
/// label scores per input, either every label (`[[{label, score}, ..], ..]`)
/// or only the best one (`[{label, score}, ..]`).
pub struct HttpClassifier {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    timeout: Duration,
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    inputs: &'a [String],
    max_length: usize,
    truncation: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct LabelScore {
    label: String,
    score: f64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClassifyResponse {
    AllScores(Vec<Vec<LabelScore>>),
    TopLabel(Vec<LabelScore>),
}

impl HttpClassifier {
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            api_key,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build from config, if an endpoint is configured.
    pub fn from_config(config: &Config) -> Option<Self> {
        let url = config.classifier_url.as_deref()?;
        Some(Self::new(url, config.classifier_api_key.clone()).with_timeout(config.http_timeout))
    }
}

#[async_trait]
impl EmotionClassifier for HttpClassifier {
    async fn classify_batch(&self, texts: &[String], max_tokens: usize) -> Result<Vec<String>> {
        let body = ClassifyRequest {
            inputs: texts,
            max_length: max_tokens,
            truncation: true,
        };

        let mut request = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request.send().await.map_err(request_error)?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(PipelineError::Network(format!(
                "classifier returned status {}: {}",
                status.as_u16(),
                message
            )));
        }

        let text = resp.text().await.map_err(request_error)?;
        debug!(inputs = texts.len(), bytes = text.len(), "classifier: response received");
        let parsed: ClassifyResponse = serde_json::from_str(&text)?;
        best_labels(parsed)
    }
}

fn request_error(err: reqwest::Error) -> PipelineError {
    if err.is_decode() {
        PipelineError::Format(err.to_string())
    } else {
        PipelineError::Network(err.to_string())
    }
}

fn best_labels(response: ClassifyResponse) -> Result<Vec<String>> {
    match response {
        ClassifyResponse::TopLabel(scores) => scores.iter().map(|s| label_name(&s.label)).collect(),
        ClassifyResponse::AllScores(per_input) => per_input
            .iter()
            .map(|scores| {
                let best = scores
                    .iter()
                    .max_by(|a, b| a.score.total_cmp(&b.score))
                    .ok_or_else(|| PipelineError::Format("classifier returned no scores".into()))?;
                label_name(&best.label)
            })
            .collect(),
    }
}

/// Map a model label to an emotion name. Accepts the names themselves or
/// positional `LABEL_<n>` ids.
fn label_name(raw: &str) -> Result<String> {
    if EMOTION_NAMES.contains(&raw) {
        return Ok(raw.to_string());
    }
    raw.strip_prefix("LABEL_")
        .and_then(|n| n.parse::<usize>().ok())
        .and_then(|idx| EMOTION_NAMES.get(idx))
        .map(|name| name.to_string())
        .ok_or_else(|| PipelineError::Format(format!("unknown classifier label: {raw}")))
}
