//! OpenAI-compatible upstream completion client.
//!
//! Works with any endpoint exposing `/v1/chat/completions` semantics. The
//! composed message sequence is forwarded verbatim; only the first choice's
//! content comes back.

use async_trait::async_trait;
use loregate_core::{CompletionClient, Message, UpstreamError};
use serde::Deserialize;
use tracing::{debug, warn};

/// An OpenAI-compatible chat-completion client.
pub struct OpenAiCompatClient {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    /// Create a new client. `base_url` is the API root, e.g.
    /// `https://api.openai.com/v1`.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| UpstreamError::Network(e.to_string()))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        model: &str,
        messages: &[Message],
    ) -> Result<String, UpstreamError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": model,
            "messages": messages,
            "temperature": 1,
            "stream": false,
        });

        debug!(client = %self.name, model, count = messages.len(), "sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| UpstreamError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status == 429 {
            return Err(UpstreamError::RateLimited {
                retry_after_secs: 5,
            });
        }
        if status == 401 || status == 403 {
            return Err(UpstreamError::AuthenticationFailed(
                "invalid API key or insufficient permissions".into(),
            ));
        }
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            warn!(status, body = %body, "upstream returned error");
            return Err(UpstreamError::Api {
                status_code: status,
                message: body,
            });
        }

        let api_response: ApiResponse =
            response.json().await.map_err(|e| UpstreamError::Api {
                status_code: 200,
                message: format!("failed to parse response: {e}"),
            })?;

        let reply = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        if reply.is_empty() {
            return Err(UpstreamError::EmptyResponse);
        }
        Ok(reply)
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiChoiceMessage,
}

#[derive(Deserialize)]
struct ApiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}
