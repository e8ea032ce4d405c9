//! OpenAI provider implementation
//!
//! Translates canonical messages into the Chat Completions wire format,
//! attaches bearer auth, and reassembles SSE streams. The canonical
//! `{role, content}` shape matches the wire schema, so messages pass
//! through unchanged.

use crate::config::OpenAiConfig;
use crate::error::{GatewayError, Result};
use crate::providers::base::{
    error_for_status, request_error, usage_map, ChatMessage, ChatProvider, GenerationParams,
    GenerationResult, TextStream,
};
use crate::providers::stream::{fragment_stream, response_lines, Frame};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// OpenAI chat API provider
pub struct OpenAiProvider {
    client: Client,
    config: OpenAiConfig,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: usize,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    model: String,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

/// One SSE `data:` chunk of a streamed completion
#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelListResponse {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

impl OpenAiProvider {
    /// Create a new OpenAI provider instance.
    ///
    /// # Errors
    ///
    /// Returns an error if HTTP client initialization fails.
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .user_agent("convogate/0.1.0")
            .build()
            .map_err(|e| {
                GatewayError::Config(format!("failed to create HTTP client: {}", e))
            })?;

        tracing::info!(api_base = %config.api_base, model = %config.model, "initialized OpenAI provider");
        Ok(Self { client, config })
    }

    fn api_key(&self) -> Result<&str> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| GatewayError::Config("OpenAI API key not configured".to_string()))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    fn resolve_model<'a>(&'a self, params: &'a GenerationParams) -> &'a str {
        params.model.as_deref().unwrap_or(&self.config.model)
    }

    async fn post_completion(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let key = self.api_key()?;
        let body = ChatCompletionRequest {
            model: self.resolve_model(params),
            messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            stream,
        };

        tracing::debug!(
            model = body.model,
            message_count = messages.len(),
            stream,
            "sending OpenAI chat completion request"
        );

        let response = self
            .client
            .post(self.endpoint("chat/completions"))
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;
        error_for_status(response).await
    }
}

/// Parses one SSE line of a streamed completion.
///
/// Non-`data:` lines and malformed JSON are skipped; `[DONE]` terminates.
fn parse_stream_frame(line: &str) -> Frame {
    let Some(data) = line.strip_prefix("data:") else {
        return Frame::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Frame::Done;
    }
    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|text| !text.is_empty())
            .map(Frame::Fragment)
            .unwrap_or(Frame::Skip),
        Err(_) => {
            tracing::debug!("skipping malformed OpenAI stream frame");
            Frame::Skip
        }
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn default_model(&self) -> String {
        self.config.model.clone()
    }

    async fn send(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<GenerationResult> {
        let response = self.post_completion(messages, params, false).await?;
        let parsed: ChatCompletionResponse = response.json().await.map_err(|e| {
            GatewayError::provider(None, format!("failed to parse OpenAI response: {}", e))
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| GatewayError::provider(None, "OpenAI response contained no choices"))?;

        Ok(GenerationResult {
            content,
            model: parsed.model,
            provider: self.name().to_string(),
            usage: usage_map(&parsed.usage),
            timestamp: Utc::now(),
            streamed: false,
        })
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<TextStream> {
        let response = self.post_completion(messages, params, true).await?;
        Ok(fragment_stream(response_lines(response), parse_stream_frame))
    }

    async fn list_models(&self) -> Vec<String> {
        let key = match self.api_key() {
            Ok(key) => key,
            Err(_) => return Vec::new(),
        };

        let response = match self
            .client
            .get(self.endpoint("models"))
            .bearer_auth(key)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                tracing::warn!(status = %response.status(), "OpenAI model listing failed");
                return Vec::new();
            }
            Err(err) => {
                tracing::warn!(error = %err, "OpenAI model listing unreachable");
                return Vec::new();
            }
        };

        match response.json::<ModelListResponse>().await {
            Ok(list) => list
                .data
                .into_iter()
                .map(|entry| entry.id)
                .filter(|id| id.contains("gpt"))
                .collect(),
            Err(err) => {
                tracing::warn!(error = %err, "failed to parse OpenAI model list");
                Vec::new()
            }
        }
    }
}
