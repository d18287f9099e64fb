//! Completion clients.
//!
//! [`CompletionClient`] is the seam between the chat service and whatever
//! model answers it. [`OpenRouterClient`] speaks the OpenAI-compatible
//! `chat/completions` protocol over HTTPS.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::types::{ChatError, ChatResult, Role};
use crate::config::ChatConfig;

/// One message as sent upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionMessage {
    pub role: Role,
    pub content: String,
}

impl CompletionMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Something that turns a conversation into the next assistant turn.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, messages: &[CompletionMessage]) -> ChatResult<String>;
}

// ---------------------------------------------------------------------------
// OpenRouter
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [CompletionMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// OpenAI-compatible HTTP client.
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl OpenRouterClient {
    /// Build a client with the configured timeout.
    pub fn new(config: &ChatConfig) -> ChatResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ChatError::Upstream(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl CompletionClient for OpenRouterClient {
    async fn complete(&self, messages: &[CompletionMessage]) -> ChatResult<String> {
        let body = CompletionRequest {
            model: &self.model,
            messages,
            stream: false,
        };
        let mut request = self.client.post(&self.endpoint).json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request.send().await.map_err(|e| {
            warn!(error = %e, "completion request failed");
            ChatError::Upstream(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(200).collect();
            warn!(%status, "completion service returned an error");
            return Err(ChatError::Upstream(format!("status {status}: {snippet}")));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ChatError::Upstream(format!("invalid completion payload: {e}")))?;
        let reply = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ChatError::Upstream("completion had no choices".into()))?;

        debug!(chars = reply.len(), "completion received");
        Ok(reply)
    }
}
