//! Conversation data model
//!
//! A conversation is the unit of persistence: an owned, titled,
//! append-only message history. Stored messages carry their own identity
//! and an opaque metadata map so assistant turns can record which model
//! and provider produced them.

use crate::providers::{ChatMessage, Role};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Title used until the first user message arrives
pub const DEFAULT_TITLE: &str = "New conversation";

/// Maximum length of a derived title before truncation
const TITLE_MAX_CHARS: usize = 50;

/// One persisted message within a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Unique message id
    pub id: String,
    /// Role of the sender
    pub role: Role,
    /// Text content
    pub content: String,
    /// When the message was appended
    pub timestamp: DateTime<Utc>,
    /// Opaque metadata (model, provider, usage for assistant turns)
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl StoredMessage {
    /// Creates a message with a fresh id and the current timestamp.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Attaches a metadata entry, consuming and returning the message.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Projects the stored message onto the canonical provider shape.
    pub fn to_chat_message(&self) -> ChatMessage {
        ChatMessage {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// A durable, owned conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation id
    pub id: String,
    /// Owner; every access is checked against this
    pub user_id: String,
    /// Display title
    pub title: String,
    /// Whether the title was set by the caller rather than derived
    #[serde(default)]
    pub custom_title: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time; strictly increases across mutations
    pub updated_at: DateTime<Utc>,
    /// Append-only message history
    pub messages: Vec<StoredMessage>,
    /// Opaque conversation-level metadata
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Conversation {
    /// Creates an empty conversation for `user_id`.
    ///
    /// When `title` is `None` the placeholder title is used and the first
    /// user message will replace it; an explicit title sticks.
    pub fn new(user_id: impl Into<String>, title: Option<String>) -> Self {
        let now = Utc::now();
        let custom_title = title.is_some();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            title: title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            custom_title,
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Appends a message, deriving the title from the first user message
    /// when the caller never set one explicitly.
    pub fn push_message(&mut self, message: StoredMessage) {
        if !self.custom_title
            && message.role == Role::User
            && !self.messages.iter().any(|m| m.role == Role::User)
        {
            self.title = derive_title(&message.content);
        }
        self.messages.push(message);
        self.touch();
    }

    /// Replaces the title with a caller-supplied one.
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.custom_title = true;
        self.touch();
    }

    /// Bumps `updated_at`, guaranteeing a strict increase even when the
    /// clock has not advanced past the previous value.
    pub fn touch(&mut self) {
        let now = Utc::now();
        self.updated_at = if now > self.updated_at {
            now
        } else {
            self.updated_at + Duration::nanoseconds(1)
        };
    }

    /// Whether the conversation has been idle since before `cutoff`.
    pub fn expired_before(&self, cutoff: DateTime<Utc>) -> bool {
        self.updated_at < cutoff
    }
}

/// Derives a display title from message content.
///
/// The content is trimmed and truncated to 50 characters, with an
/// ellipsis marking the cut. Whitespace-only content keeps the
/// placeholder title.
pub fn derive_title(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return DEFAULT_TITLE.to_string();
    }
    let mut title: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
    if trimmed.chars().count() > TITLE_MAX_CHARS {
        title.push_str("...");
    }
    title
}
