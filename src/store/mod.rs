//! Durable conversation store
//!
//! [`ConversationStore`] keeps every conversation in an in-memory index
//! guarded by an async `RwLock` and writes through to a durable backend
//! on each mutation. A mutation becomes visible in the index only after
//! the backend accepted it, so the index never gets ahead of disk.
//!
//! Ownership is enforced here: reads distinguish `NotFound` from
//! `Forbidden`, and the gateway collapses the two at its boundary.

pub mod backend;
pub mod types;

pub use backend::{SledStorage, StorageBackend};
pub use types::{derive_title, Conversation, StoredMessage, DEFAULT_TITLE};

use crate::error::{GatewayError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Listing projection of a conversation, without its message bodies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// Conversation id
    pub id: String,
    /// Display title
    pub title: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
    /// Number of stored messages
    pub message_count: usize,
}

impl From<&Conversation> for ConversationSummary {
    fn from(convo: &Conversation) -> Self {
        Self {
            id: convo.id.clone(),
            title: convo.title.clone(),
            created_at: convo.created_at,
            updated_at: convo.updated_at,
            message_count: convo.messages.len(),
        }
    }
}

/// In-memory index over a durable backend
pub struct ConversationStore {
    backend: Box<dyn StorageBackend>,
    index: RwLock<HashMap<String, Conversation>>,
}

impl ConversationStore {
    /// Opens the store, loading every persisted conversation into the
    /// index. Records that fail to deserialize are skipped with a warning
    /// so one corrupt document never blocks startup.
    pub fn open(backend: Box<dyn StorageBackend>) -> Result<Self> {
        let mut index = HashMap::new();
        for id in backend.list_ids()? {
            match backend.read(&id) {
                Ok(Some(conversation)) => {
                    index.insert(id, conversation);
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(id = %id, error = %err, "skipping unreadable conversation record");
                }
            }
        }
        tracing::info!(count = index.len(), "loaded conversations");
        Ok(Self {
            backend,
            index: RwLock::new(index),
        })
    }

    /// Creates a new conversation owned by `user_id`.
    pub async fn create(
        &self,
        user_id: impl Into<String>,
        title: Option<String>,
    ) -> Result<Conversation> {
        let conversation = Conversation::new(user_id, title);
        self.backend.write(&conversation)?;
        self.index
            .write()
            .await
            .insert(conversation.id.clone(), conversation.clone());
        tracing::debug!(id = %conversation.id, "created conversation");
        Ok(conversation)
    }

    /// Returns a snapshot of a conversation, enforcing ownership.
    ///
    /// # Errors
    ///
    /// `NotFound` when the id is unknown, `Forbidden` when it belongs to a
    /// different user.
    pub async fn get(&self, id: &str, user_id: &str) -> Result<Conversation> {
        let index = self.index.read().await;
        let conversation = index.get(id).ok_or(GatewayError::NotFound)?;
        if conversation.user_id != user_id {
            return Err(GatewayError::Forbidden);
        }
        Ok(conversation.clone())
    }

    /// Appends a message and returns the updated conversation snapshot.
    ///
    /// The title may be derived from the first user message and
    /// `updated_at` always advances; the mutation is durable before it is
    /// visible.
    pub async fn append(
        &self,
        id: &str,
        user_id: &str,
        message: StoredMessage,
    ) -> Result<Conversation> {
        let mut index = self.index.write().await;
        let current = index.get(id).ok_or(GatewayError::NotFound)?;
        if current.user_id != user_id {
            return Err(GatewayError::Forbidden);
        }
        let mut updated = current.clone();
        updated.push_message(message);
        self.backend.write(&updated)?;
        index.insert(id.to_string(), updated.clone());
        Ok(updated)
    }

    /// Replaces a conversation's title with a caller-supplied one.
    ///
    /// Returns `false` without any state change when the conversation is
    /// absent, foreign-owned, or the persist fails; the operation is
    /// idempotent and never leaks existence.
    pub async fn update_title(&self, id: &str, user_id: &str, title: impl Into<String>) -> bool {
        let mut index = self.index.write().await;
        let Some(current) = index.get(id) else {
            return false;
        };
        if current.user_id != user_id {
            return false;
        }
        let mut updated = current.clone();
        updated.set_title(title);
        if let Err(err) = self.backend.write(&updated) {
            tracing::error!(id = %id, error = %err, "failed to persist title update");
            return false;
        }
        index.insert(id.to_string(), updated);
        true
    }

    /// Deletes a conversation, enforcing ownership.
    ///
    /// Returns `false` without any state change when the conversation is
    /// absent or foreign-owned; deleting twice is not an error.
    pub async fn delete(&self, id: &str, user_id: &str) -> bool {
        let mut index = self.index.write().await;
        let Some(current) = index.get(id) else {
            return false;
        };
        if current.user_id != user_id {
            return false;
        }
        if let Err(err) = self.backend.delete(id) {
            tracing::error!(id = %id, error = %err, "failed to delete conversation record");
            return false;
        }
        index.remove(id);
        tracing::debug!(id = %id, "deleted conversation");
        true
    }

    /// Lists a user's conversations, most recently updated first.
    ///
    /// `offset` skips past results already seen; `limit` caps the page
    /// size. Ties cannot occur because `updated_at` strictly increases.
    pub async fn list_for_user(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Vec<ConversationSummary> {
        let index = self.index.read().await;
        let mut summaries: Vec<ConversationSummary> = index
            .values()
            .filter(|c| c.user_id == user_id)
            .map(ConversationSummary::from)
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        summaries.into_iter().skip(offset).take(limit).collect()
    }

    /// Removes every conversation idle since before `cutoff`, returning
    /// the number removed. Conversations whose backend delete fails stay
    /// in the index for the next sweep.
    pub async fn sweep_expired(&self, cutoff: DateTime<Utc>) -> usize {
        let mut index = self.index.write().await;
        let expired: Vec<String> = index
            .values()
            .filter(|c| c.expired_before(cutoff))
            .map(|c| c.id.clone())
            .collect();

        let mut removed = 0;
        for id in expired {
            match self.backend.delete(&id) {
                Ok(()) => {
                    index.remove(&id);
                    removed += 1;
                }
                Err(err) => {
                    tracing::warn!(id = %id, error = %err, "failed to remove expired conversation");
                }
            }
        }
        if removed > 0 {
            tracing::info!(removed, "swept expired conversations");
        }
        removed
    }

    /// Number of conversations currently indexed.
    pub async fn len(&self) -> usize {
        self.index.read().await.len()
    }

    /// Whether the store holds no conversations.
    pub async fn is_empty(&self) -> bool {
        self.index.read().await.is_empty()
    }
}
