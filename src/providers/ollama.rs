//! Ollama provider implementation for local LLM inference
//!
//! Ollama's generate endpoint takes a single prompt string rather than a
//! message array, so the conversation is flattened into labelled turns
//! before dispatch. Responses arrive as NDJSON frames; no credential is
//! required.

use crate::config::OllamaConfig;
use crate::error::{GatewayError, Result};
use crate::providers::base::{
    error_for_status, request_error, ChatMessage, ChatProvider, GenerationParams,
    GenerationResult, Role, TextStream,
};
use crate::providers::stream::{fragment_stream, response_lines, Frame};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Ollama local inference provider
pub struct OllamaProvider {
    client: Client,
    config: OllamaConfig,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: usize,
}

/// One NDJSON frame; the final frame has `done: true`.
#[derive(Debug, Deserialize)]
struct GenerateFrame {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    eval_count: Option<u64>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

impl OllamaProvider {
    /// Create a new Ollama provider instance.
    ///
    /// # Errors
    ///
    /// Returns an error if HTTP client initialization fails.
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .user_agent("convogate/0.1.0")
            .build()
            .map_err(|e| {
                GatewayError::Config(format!("failed to create HTTP client: {}", e))
            })?;

        tracing::info!(host = %config.host, model = %config.model, "initialized Ollama provider");
        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.host.trim_end_matches('/'), path)
    }

    fn resolve_model<'a>(&'a self, params: &'a GenerationParams) -> &'a str {
        params.model.as_deref().unwrap_or(&self.config.model)
    }

    async fn post_generate(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let body = GenerateRequest {
            model: self.resolve_model(params),
            prompt: flatten_prompt(messages),
            stream,
            options: GenerateOptions {
                temperature: params.temperature,
                num_predict: params.max_tokens,
            },
        };

        tracing::debug!(
            model = body.model,
            prompt_len = body.prompt.len(),
            stream,
            "sending Ollama generate request"
        );

        let response = self
            .client
            .post(self.endpoint("api/generate"))
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;
        error_for_status(response).await
    }
}

/// Flattens a message array into a single labelled prompt.
///
/// Each turn becomes a `System:`/`Human:`/`Assistant:` paragraph, and a
/// trailing `Assistant:` label cues the model to continue the dialogue.
fn flatten_prompt(messages: &[ChatMessage]) -> String {
    let mut prompt = String::new();
    for message in messages {
        let label = match message.role {
            Role::System => "System",
            Role::User => "Human",
            Role::Assistant => "Assistant",
        };
        prompt.push_str(label);
        prompt.push_str(": ");
        prompt.push_str(&message.content);
        prompt.push_str("\n\n");
    }
    prompt.push_str("Assistant:");
    prompt
}

/// Parses one NDJSON line of a streamed generation.
///
/// A `done` frame usually carries no text; when it does, the text is
/// yielded and the stream still terminates at the marker.
fn parse_stream_frame(line: &str) -> Frame {
    match serde_json::from_str::<GenerateFrame>(line) {
        Ok(frame) => match (frame.done, frame.response.is_empty()) {
            (true, true) => Frame::Done,
            (true, false) => Frame::Final(frame.response),
            (false, true) => Frame::Skip,
            (false, false) => Frame::Fragment(frame.response),
        },
        Err(_) => {
            if !line.trim().is_empty() {
                tracing::debug!("skipping malformed Ollama stream frame");
            }
            Frame::Skip
        }
    }
}

#[async_trait]
impl ChatProvider for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn default_model(&self) -> String {
        self.config.model.clone()
    }

    async fn send(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<GenerationResult> {
        let model = self.resolve_model(params).to_string();
        let response = self.post_generate(messages, params, false).await?;
        let frame: GenerateFrame = response.json().await.map_err(|e| {
            GatewayError::provider(None, format!("failed to parse Ollama response: {}", e))
        })?;

        let mut usage = HashMap::new();
        if let Some(count) = frame.prompt_eval_count {
            usage.insert("prompt_eval_count".to_string(), serde_json::json!(count));
        }
        if let Some(count) = frame.eval_count {
            usage.insert("eval_count".to_string(), serde_json::json!(count));
        }

        Ok(GenerationResult {
            content: frame.response,
            model,
            provider: self.name().to_string(),
            usage,
            timestamp: Utc::now(),
            streamed: false,
        })
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<TextStream> {
        let response = self.post_generate(messages, params, true).await?;
        Ok(fragment_stream(response_lines(response), parse_stream_frame))
    }

    async fn list_models(&self) -> Vec<String> {
        let response = match self.client.get(self.endpoint("api/tags")).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                tracing::warn!(status = %response.status(), "Ollama model listing failed");
                return Vec::new();
            }
            Err(err) => {
                tracing::warn!(error = %err, "Ollama server unreachable");
                return Vec::new();
            }
        };

        match response.json::<TagsResponse>().await {
            Ok(tags) => tags.models.into_iter().map(|entry| entry.name).collect(),
            Err(err) => {
                tracing::warn!(error = %err, "failed to parse Ollama tag list");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_prompt_labels_turns() {
        let messages = vec![
            ChatMessage::system("be brief"),
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
            ChatMessage::user("how are you?"),
        ];
        let prompt = flatten_prompt(&messages);
        assert_eq!(
            prompt,
            "System: be brief\n\nHuman: hi\n\nAssistant: hello\n\nHuman: how are you?\n\nAssistant:"
        );
    }

    #[test]
    fn test_flatten_prompt_empty_still_cues_assistant() {
        assert_eq!(flatten_prompt(&[]), "Assistant:");
    }

    #[test]
    fn test_parse_stream_frame_text() {
        let line = r#"{"response":"Hel","done":false}"#;
        match parse_stream_frame(line) {
            Frame::Fragment(text) => assert_eq!(text, "Hel"),
            _ => panic!("expected fragment"),
        }
    }

    #[test]
    fn test_parse_stream_frame_done_without_text() {
        let line = r#"{"response":"","done":true,"eval_count":42}"#;
        assert!(matches!(parse_stream_frame(line), Frame::Done));
    }

    #[test]
    fn test_parse_stream_frame_done_with_text_is_final() {
        let line = r#"{"response":"!","done":true}"#;
        match parse_stream_frame(line) {
            Frame::Final(text) => assert_eq!(text, "!"),
            _ => panic!("expected final fragment"),
        }
    }

    #[test]
    fn test_parse_stream_frame_skips_malformed() {
        assert!(matches!(parse_stream_frame("{broken"), Frame::Skip));
        assert!(matches!(parse_stream_frame(""), Frame::Skip));
    }

    #[test]
    fn test_request_body_wire_shape() {
        let body = GenerateRequest {
            model: "llama2",
            prompt: "Human: hi\n\nAssistant:".to_string(),
            stream: true,
            options: GenerateOptions {
                temperature: 0.7,
                num_predict: 500,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "llama2");
        assert_eq!(json["options"]["num_predict"], 500);
        assert_eq!(json["stream"], true);
    }
}
