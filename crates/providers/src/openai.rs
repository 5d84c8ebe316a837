//! OpenAI-compatible chat completions as an `Oracle`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use nodes::{Oracle, OracleError, OracleRequest};

use crate::ProviderError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone)]
pub struct ChatOracleConfig {
    pub api_key: String,
    pub model: String,
    /// Root of the API; `/chat/completions` is appended.
    pub base_url: String,
    pub timeout: Duration,
}

impl ChatOracleConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_owned(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// Sends each request in JSON mode and returns the message text untouched;
/// parsing and validation happen in `nodes::oracle::invoke`.
#[derive(Debug, Clone)]
pub struct ChatOracle {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl ChatOracle {
    pub fn new(config: ChatOracleConfig) -> Result<Self, ProviderError> {
        if config.api_key.trim().is_empty() {
            return Err(ProviderError::Config("api key is empty".into()));
        }

        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key,
            model: config.model,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Oracle for ChatOracle {
    #[instrument(skip_all, fields(schema = %request.schema, model = %self.model))]
    async fn generate(&self, request: &OracleRequest) -> Result<String, OracleError> {
        let payload = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
            "response_format": { "type": "json_object" },
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| OracleError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Unreachable(format!(
                "chat endpoint returned {status}: {}",
                truncate(&body, 320)
            )));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Unreachable(format!("invalid chat response: {e}")))?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| OracleError::MalformedOutput("response has no message content".into()))?;

        debug!(chars = content.len(), "oracle answered");
        Ok(content)
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
