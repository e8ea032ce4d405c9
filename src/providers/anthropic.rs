//! Anthropic provider implementation
//!
//! The Messages API rejects `system` roles inside the message array, so
//! system messages are hoisted into the top-level `system` field before
//! dispatch. Streaming uses typed SSE events: `content_block_delta`
//! carries text, `message_stop` ends the stream.

use crate::config::AnthropicConfig;
use crate::error::{GatewayError, Result};
use crate::providers::base::{
    error_for_status, request_error, usage_map, ChatMessage, ChatProvider, GenerationParams,
    GenerationResult, Role, TextStream,
};
use crate::providers::stream::{fragment_stream, response_lines, Frame};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Anthropic Messages API provider
pub struct AnthropicProvider {
    client: Client,
    config: AnthropicConfig,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    messages: Vec<&'a ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    temperature: f32,
    max_tokens: usize,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    model: String,
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

/// One SSE event frame of a streamed message
#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    delta: Option<EventDelta>,
}

#[derive(Debug, Deserialize)]
struct EventDelta {
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider instance.
    ///
    /// # Errors
    ///
    /// Returns an error if HTTP client initialization fails.
    pub fn new(config: AnthropicConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .user_agent("convogate/0.1.0")
            .build()
            .map_err(|e| {
                GatewayError::Config(format!("failed to create HTTP client: {}", e))
            })?;

        tracing::info!(api_base = %config.api_base, model = %config.model, "initialized Anthropic provider");
        Ok(Self { client, config })
    }

    fn api_key(&self) -> Result<&str> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| GatewayError::Config("Anthropic API key not configured".to_string()))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    fn resolve_model<'a>(&'a self, params: &'a GenerationParams) -> &'a str {
        params.model.as_deref().unwrap_or(&self.config.model)
    }

    async fn post_messages(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let key = self.api_key()?;
        let (system, chat) = split_system(messages);
        let body = MessagesRequest {
            model: self.resolve_model(params),
            messages: chat,
            system,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            stream,
        };

        tracing::debug!(
            model = body.model,
            message_count = body.messages.len(),
            has_system = body.system.is_some(),
            stream,
            "sending Anthropic messages request"
        );

        let response = self
            .client
            .post(self.endpoint("messages"))
            .header("x-api-key", key)
            .header("anthropic-version", &self.config.version)
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;
        error_for_status(response).await
    }
}

/// Hoists system messages into the top-level `system` field.
///
/// Multiple system messages are concatenated with newlines in their
/// original order; the remaining user/assistant messages keep theirs.
fn split_system(messages: &[ChatMessage]) -> (Option<String>, Vec<&ChatMessage>) {
    let mut system_parts = Vec::new();
    let mut chat = Vec::new();
    for message in messages {
        if message.role == Role::System {
            system_parts.push(message.content.as_str());
        } else {
            chat.push(message);
        }
    }
    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n"))
    };
    (system, chat)
}

/// Parses one SSE line of a streamed message.
fn parse_stream_frame(line: &str) -> Frame {
    let Some(data) = line.strip_prefix("data:") else {
        return Frame::Skip;
    };
    match serde_json::from_str::<StreamEvent>(data.trim()) {
        Ok(event) => match event.event_type.as_str() {
            "content_block_delta" => event
                .delta
                .and_then(|delta| delta.text)
                .filter(|text| !text.is_empty())
                .map(Frame::Fragment)
                .unwrap_or(Frame::Skip),
            "message_stop" => Frame::Done,
            _ => Frame::Skip,
        },
        Err(_) => {
            tracing::debug!("skipping malformed Anthropic stream frame");
            Frame::Skip
        }
    }
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn default_model(&self) -> String {
        self.config.model.clone()
    }

    async fn send(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<GenerationResult> {
        let response = self.post_messages(messages, params, false).await?;
        let parsed: MessagesResponse = response.json().await.map_err(|e| {
            GatewayError::provider(None, format!("failed to parse Anthropic response: {}", e))
        })?;

        let content = parsed
            .content
            .into_iter()
            .map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

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
        let response = self.post_messages(messages, params, true).await?;
        Ok(fragment_stream(response_lines(response), parse_stream_frame))
    }

    /// Anthropic exposes no model-listing endpoint; the adapter advertises
    /// the models it is known to work with.
    async fn list_models(&self) -> Vec<String> {
        vec![
            "claude-3-opus-20240229".to_string(),
            "claude-3-sonnet-20240229".to_string(),
            "claude-3-haiku-20240307".to_string(),
        ]
    }
}
