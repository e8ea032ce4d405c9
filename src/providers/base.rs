//! Base provider trait and canonical types
//!
//! This module defines the `ChatProvider` trait that all LLM backends
//! implement, along with the gateway's canonical message and result types.
//! Adapters translate between these canonical types and each provider's
//! wire schema so the rest of the gateway never sees provider-specific
//! formats.

use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions that frame the whole conversation
    System,
    /// End-user input
    User,
    /// Model output
    Assistant,
}

impl Role {
    /// Returns the lowercase wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical `{role, content}` message
///
/// Serializes to the plain shape most chat APIs accept directly.
///
/// # Examples
///
/// ```
/// use convogate::providers::{ChatMessage, Role};
///
/// let msg = ChatMessage::user("Hello!");
/// assert_eq!(msg.role, Role::User);
/// assert_eq!(msg.content, "Hello!");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender
    pub role: Role,
    /// Text content
    pub content: String,
}

impl ChatMessage {
    /// Creates a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Creates a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Creates a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Generation parameters for a single request
///
/// Ephemeral; never persisted.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    /// Model override; adapters fall back to their configured default
    pub model: Option<String>,
    /// Sampling temperature in `[0, 1]`
    pub temperature: f32,
    /// Maximum output tokens
    pub max_tokens: usize,
    /// Whether the caller wants a streamed response
    pub stream: bool,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            model: None,
            temperature: 0.7,
            max_tokens: 1000,
            stream: false,
        }
    }
}

/// Canonical result of a generation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    /// Generated text
    pub content: String,
    /// Resolved model name
    pub model: String,
    /// Provider name that served the request
    pub provider: String,
    /// Provider-specific usage metadata (opaque key-value)
    pub usage: HashMap<String, serde_json::Value>,
    /// Completion timestamp
    pub timestamp: DateTime<Utc>,
    /// Whether the content was reassembled from a stream
    pub streamed: bool,
}

/// Lazy sequence of streamed text fragments
///
/// Finite, ordered, and not restartable. Dropping the stream cancels the
/// underlying HTTP connection; no fragment is yielded after cancellation.
pub type TextStream = BoxStream<'static, Result<String>>;

/// Provider trait for LLM backends
///
/// All providers (OpenAI, Anthropic, Ollama) implement this trait. The
/// orchestrator selects an implementation through the
/// [`crate::providers::ProviderRegistry`] and never branches on provider
/// identity itself.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Stable provider name used as the registry key.
    fn name(&self) -> &'static str;

    /// The model used when a request does not name one.
    fn default_model(&self) -> String;

    /// Sends messages and returns the complete response.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Provider` on a non-success status (carrying
    /// the status code and raw body) or a transport failure.
    async fn send(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<GenerationResult>;

    /// Sends messages and returns a stream of text fragments.
    ///
    /// Concatenating all fragments in order yields the same content a
    /// non-streaming call with identical inputs would return. Malformed
    /// frames are skipped, never fatal.
    async fn stream(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<TextStream>;

    /// Lists available model identifiers.
    ///
    /// Best-effort: returns an empty list on any failure. Model listing is
    /// informational and never load-bearing for chat.
    async fn list_models(&self) -> Vec<String>;
}

/// Fails with a provider error when the response status is non-success.
///
/// The raw body is captured as-is; it is never partially parsed.
pub(crate) async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::error!(status = %status, "provider returned non-success status");
    Err(GatewayError::provider(Some(status.as_u16()), body))
}

/// Maps a transport-level request error to a provider error.
pub(crate) fn request_error(err: reqwest::Error) -> GatewayError {
    GatewayError::provider(err.status().map(|s| s.as_u16()), err.to_string())
}

/// Flattens a provider's JSON usage object into the opaque usage map.
pub(crate) fn usage_map(value: &serde_json::Value) -> HashMap<String, serde_json::Value> {
    value
        .as_object()
        .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default()
}
