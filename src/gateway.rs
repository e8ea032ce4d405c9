//! Gateway orchestrator
//!
//! [`ChatGateway`] ties the store, windower, and provider registry
//! together behind the operations the embedding HTTP layer calls. A turn
//! is: validate, resolve or create the conversation, append the user
//! message, window the history, dispatch to the selected provider, append
//! the assistant message, respond. If generation fails the already
//! appended user message stays; the caller may retry in the same
//! conversation.
//!
//! At this boundary a foreign-owned conversation is reported as
//! `NotFound`, so callers cannot probe for the existence of other users'
//! conversations.

use crate::context::window_messages;
use crate::error::{GatewayError, Result};
use crate::providers::{GenerationParams, GenerationResult, ProviderRegistry, Role};
use crate::store::{ConversationStore, ConversationSummary, StoredMessage};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Upper bound on per-request output tokens
const MAX_OUTPUT_TOKENS: usize = 4000;

/// Upper bound on the page size of listing calls
const MAX_LIST_LIMIT: usize = 100;

/// One chat turn as submitted by the caller
#[derive(Debug, Clone, Deserialize)]
pub struct TurnRequest {
    /// Existing conversation to continue; `None` starts a new one
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Caller identity; checked against conversation ownership
    pub user_id: String,
    /// User message text
    pub message: String,
    /// Provider name (`openai`, `anthropic`, `ollama`)
    pub provider: String,
    /// Model override; `None` uses the provider's configured default
    #[serde(default)]
    pub model: Option<String>,
    /// Sampling temperature in `[0, 1]`
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum output tokens, in `1..=4000`
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    /// Whether to generate via the provider's streaming path
    #[serde(default)]
    pub stream: bool,
    /// System message to seed a newly created conversation with
    #[serde(default)]
    pub system_message: Option<String>,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> usize {
    1000
}

/// Completed chat turn
#[derive(Debug, Clone, Serialize)]
pub struct TurnResponse {
    /// Conversation the turn belongs to (fresh id for new conversations)
    pub conversation_id: String,
    /// Id of the stored assistant message
    pub message_id: String,
    /// Full generated content
    pub content: String,
    /// Model that produced the content
    pub model: String,
    /// Provider that served the request
    pub provider: String,
    /// Provider usage metadata, empty when unavailable
    pub usage: HashMap<String, serde_json::Value>,
    /// Completion timestamp
    pub timestamp: DateTime<Utc>,
}

/// Orchestrator over the store and the provider registry
pub struct ChatGateway {
    store: Arc<ConversationStore>,
    providers: ProviderRegistry,
}

impl ChatGateway {
    /// Creates a gateway over an opened store and a populated registry.
    pub fn new(store: Arc<ConversationStore>, providers: ProviderRegistry) -> Self {
        Self { store, providers }
    }

    /// Shared handle to the underlying store, e.g. for the retention
    /// sweeper.
    pub fn store(&self) -> Arc<ConversationStore> {
        Arc::clone(&self.store)
    }

    /// Executes one chat turn.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for out-of-range parameters or an unknown
    /// provider, `NotFound` for a missing or foreign conversation,
    /// `Provider` when generation fails. A generation failure leaves the
    /// appended user message in place.
    pub async fn send_turn(&self, request: TurnRequest) -> Result<TurnResponse> {
        validate_turn(&request)?;
        let provider = self.providers.get(&request.provider)?;

        let conversation = match &request.conversation_id {
            Some(id) => self
                .store
                .get(id, &request.user_id)
                .await
                .map_err(mask_forbidden)?,
            None => {
                self.create_conversation(&request.user_id, None, request.system_message.clone())
                    .await?
            }
        };

        let conversation = self
            .store
            .append(
                &conversation.id,
                &request.user_id,
                StoredMessage::new(Role::User, request.message.clone()),
            )
            .await?;

        // Fixed 50/50 split of the budget between input context and output
        let context = window_messages(&conversation, Some(request.max_tokens / 2));
        let params = GenerationParams {
            model: request.model.clone(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: request.stream,
        };

        tracing::info!(
            conversation_id = %conversation.id,
            provider = %request.provider,
            context_len = context.len(),
            stream = request.stream,
            "dispatching turn"
        );

        let result = if request.stream {
            let stream = provider.stream(&context, &params).await?;
            let content = collect_stream(stream).await?;
            GenerationResult {
                content,
                model: params
                    .model
                    .clone()
                    .unwrap_or_else(|| provider.default_model()),
                provider: provider.name().to_string(),
                usage: HashMap::new(),
                timestamp: Utc::now(),
                streamed: true,
            }
        } else {
            provider.send(&context, &params).await?
        };

        let assistant = StoredMessage::new(Role::Assistant, result.content.clone())
            .with_metadata("model", serde_json::json!(result.model))
            .with_metadata("provider", serde_json::json!(result.provider))
            .with_metadata("usage", serde_json::json!(result.usage));
        let message_id = assistant.id.clone();

        self.store
            .append(&conversation.id, &request.user_id, assistant)
            .await?;

        Ok(TurnResponse {
            conversation_id: conversation.id,
            message_id,
            content: result.content,
            model: result.model,
            provider: result.provider,
            usage: result.usage,
            timestamp: result.timestamp,
        })
    }

    /// Creates a conversation, optionally titled and seeded with a system
    /// message.
    pub async fn create_conversation(
        &self,
        user_id: &str,
        title: Option<String>,
        system_message: Option<String>,
    ) -> Result<crate::store::Conversation> {
        let conversation = self.store.create(user_id, title).await?;
        match system_message {
            Some(system) => {
                self.store
                    .append(
                        &conversation.id,
                        user_id,
                        StoredMessage::new(Role::System, system),
                    )
                    .await
            }
            None => Ok(conversation),
        }
    }

    /// Fetches a conversation with its full message history.
    pub async fn get_conversation(
        &self,
        id: &str,
        user_id: &str,
    ) -> Result<crate::store::Conversation> {
        self.store.get(id, user_id).await.map_err(mask_forbidden)
    }

    /// Lists the caller's conversations, most recent first.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when `limit` is outside `1..=100`.
    pub async fn list_conversations(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ConversationSummary>> {
        if limit == 0 || limit > MAX_LIST_LIMIT {
            return Err(GatewayError::invalid(format!(
                "limit must be between 1 and {}",
                MAX_LIST_LIMIT
            )));
        }
        Ok(self.store.list_for_user(user_id, limit, offset).await)
    }

    /// Deletes a conversation.
    ///
    /// Idempotent: `false` means the conversation was absent or not owned
    /// by the caller, with no state change either way.
    pub async fn delete_conversation(&self, id: &str, user_id: &str) -> bool {
        self.store.delete(id, user_id).await
    }

    /// Renames a conversation; the new title sticks and is never
    /// re-derived. Returns `false` for an absent or foreign conversation.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when the title is empty after trimming.
    pub async fn update_title(&self, id: &str, user_id: &str, title: &str) -> Result<bool> {
        if title.trim().is_empty() {
            return Err(GatewayError::invalid("title must not be empty"));
        }
        Ok(self.store.update_title(id, user_id, title.trim()).await)
    }

    /// Lists the models a provider offers.
    pub async fn list_models(&self, provider: &str) -> Result<Vec<String>> {
        Ok(self.providers.get(provider)?.list_models().await)
    }
}

fn validate_turn(request: &TurnRequest) -> Result<()> {
    if request.message.trim().is_empty() {
        return Err(GatewayError::invalid("message must not be empty"));
    }
    if !(0.0..=1.0).contains(&request.temperature) {
        return Err(GatewayError::invalid(
            "temperature must be between 0.0 and 1.0",
        ));
    }
    if request.max_tokens == 0 || request.max_tokens > MAX_OUTPUT_TOKENS {
        return Err(GatewayError::invalid(format!(
            "max_tokens must be between 1 and {}",
            MAX_OUTPUT_TOKENS
        )));
    }
    Ok(())
}

/// Hides the existence of foreign-owned conversations from callers.
fn mask_forbidden(err: GatewayError) -> GatewayError {
    match err {
        GatewayError::Forbidden => GatewayError::NotFound,
        other => other,
    }
}

/// Drains a fragment stream into the complete content.
async fn collect_stream(mut stream: crate::providers::TextStream) -> Result<String> {
    let mut content = String::new();
    while let Some(fragment) = stream.next().await {
        content.push_str(&fragment?);
    }
    Ok(content)
}

/// Helper for building a turn request in tests and examples.
impl TurnRequest {
    /// A request with default generation parameters.
    pub fn new(
        user_id: impl Into<String>,
        message: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: None,
            user_id: user_id.into(),
            message: message.into(),
            provider: provider.into(),
            model: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            stream: false,
            system_message: None,
        }
    }
}
