//! Durable storage backends
//!
//! The store keeps its working set in memory and writes through to a
//! [`StorageBackend`]. The embedded [`SledStorage`] backend stores each
//! conversation as one JSON document keyed by conversation id and flushes
//! after every write so an accepted mutation survives process restart.

use crate::error::{GatewayError, Result};
use crate::store::types::Conversation;
use std::path::Path;

/// Key-value persistence for conversations
pub trait StorageBackend: Send + Sync {
    /// Writes (inserts or replaces) a conversation document.
    fn write(&self, conversation: &Conversation) -> Result<()>;

    /// Reads a conversation by id; `Ok(None)` when absent.
    fn read(&self, id: &str) -> Result<Option<Conversation>>;

    /// Deletes a conversation; deleting an absent id is not an error.
    fn delete(&self, id: &str) -> Result<()>;

    /// Lists every stored conversation id.
    fn list_ids(&self) -> Result<Vec<String>>;
}

/// Sled-backed storage
pub struct SledStorage {
    db: sled::Db,
}

impl SledStorage {
    /// Opens (or creates) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the database cannot be opened, e.g. when
    /// another process holds the directory lock.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path)
            .map_err(|e| GatewayError::storage(format!("failed to open database: {}", e)))?;
        tracing::info!(path = %path.display(), "opened conversation database");
        Ok(Self { db })
    }
}

impl StorageBackend for SledStorage {
    fn write(&self, conversation: &Conversation) -> Result<()> {
        let bytes = serde_json::to_vec(conversation)
            .map_err(|e| GatewayError::storage(format!("failed to serialize: {}", e)))?;
        self.db
            .insert(conversation.id.as_bytes(), bytes)
            .map_err(|e| GatewayError::storage(format!("failed to write: {}", e)))?;
        self.db
            .flush()
            .map_err(|e| GatewayError::storage(format!("failed to flush: {}", e)))?;
        Ok(())
    }

    fn read(&self, id: &str) -> Result<Option<Conversation>> {
        let Some(bytes) = self
            .db
            .get(id.as_bytes())
            .map_err(|e| GatewayError::storage(format!("failed to read: {}", e)))?
        else {
            return Ok(None);
        };
        let conversation = serde_json::from_slice(&bytes)
            .map_err(|e| GatewayError::storage(format!("corrupt record {}: {}", id, e)))?;
        Ok(Some(conversation))
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.db
            .remove(id.as_bytes())
            .map_err(|e| GatewayError::storage(format!("failed to delete: {}", e)))?;
        self.db
            .flush()
            .map_err(|e| GatewayError::storage(format!("failed to flush: {}", e)))?;
        Ok(())
    }

    fn list_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in self.db.iter() {
            let (key, _) =
                entry.map_err(|e| GatewayError::storage(format!("failed to iterate: {}", e)))?;
            match std::str::from_utf8(&key) {
                Ok(id) => ids.push(id.to_string()),
                Err(_) => tracing::warn!("skipping non-UTF-8 key in database"),
            }
        }
        Ok(ids)
    }
}
