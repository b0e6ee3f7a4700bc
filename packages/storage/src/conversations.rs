// ABOUTME: Durable conversation store over the key/value table
// ABOUTME: Persists full state and listing metadata under separate TTL'd namespaces

use chrono::{DateTime, Utc};
use specforge_core::{ConversationMetadata, ConversationState};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::kv::KvStore;
use crate::Result;

/// Namespace holding the full serialized conversation
pub const STATE_PREFIX: &str = "conversation:";
/// Namespace holding the listing projection
pub const METADATA_PREFIX: &str = "conversation-meta:";

/// Key of the full record for a conversation
pub fn state_key(id: &str) -> String {
    format!("{}{}", STATE_PREFIX, id)
}

/// Key of the listing projection for a conversation
pub fn metadata_key(id: &str) -> String {
    format!("{}{}", METADATA_PREFIX, id)
}

/// Persistence for conversation records.
///
/// Both namespaces expire at `updated_at + ttl`, so a record saved with an
/// old `updated_at` is already past its expiry.
#[derive(Clone)]
pub struct ConversationStore {
    kv: KvStore,
    ttl: chrono::Duration,
}

impl ConversationStore {
    pub fn new(kv: KvStore, ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Self { kv, ttl }
    }

    /// Open a file-backed store
    pub async fn open(path: impl AsRef<Path>, ttl: Duration) -> Result<Self> {
        Ok(Self::new(KvStore::open(path).await?, ttl))
    }

    /// In-memory store, mainly for tests
    pub async fn in_memory(ttl: Duration) -> Result<Self> {
        Ok(Self::new(KvStore::in_memory().await?, ttl))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl.to_std().unwrap_or(Duration::MAX)
    }

    fn expires_at(&self, updated_at: DateTime<Utc>) -> DateTime<Utc> {
        updated_at
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Upsert the full record and its metadata projection
    pub async fn save(&self, state: &ConversationState) -> Result<()> {
        let state_json = serde_json::to_string(state)?;
        let metadata_json = serde_json::to_string(&state.metadata())?;
        let expires_at = self.expires_at(state.updated_at);

        let state_key = state_key(&state.id);
        let metadata_key = metadata_key(&state.id);

        self.kv
            .set_many(&[
                (state_key.as_str(), state_json.as_str(), expires_at),
                (metadata_key.as_str(), metadata_json.as_str(), expires_at),
            ])
            .await?;

        debug!(
            conversation_id = %state.id,
            status = %state.status,
            messages = state.messages.len(),
            "Saved conversation"
        );
        Ok(())
    }

    /// Load a conversation.
    ///
    /// Expired and corrupt records both read as absent; corrupt ones are logged.
    pub async fn load(&self, id: &str) -> Result<Option<ConversationState>> {
        let Some(raw) = self.kv.get(&state_key(id)).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<ConversationState>(&raw) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                warn!(conversation_id = %id, "Discarding corrupt conversation record: {}", e);
                Ok(None)
            }
        }
    }

    /// Metadata for every live conversation, most recently updated first
    pub async fn list_metadata(&self) -> Result<Vec<ConversationMetadata>> {
        let entries = self.kv.scan_prefix(METADATA_PREFIX).await?;

        let mut metadata: Vec<ConversationMetadata> = entries
            .into_iter()
            .filter_map(|(key, raw)| match serde_json::from_str(&raw) {
                Ok(meta) => Some(meta),
                Err(e) => {
                    warn!("Skipping corrupt metadata entry {}: {}", key, e);
                    None
                }
            })
            .collect();

        metadata.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(metadata)
    }

    /// Hard-delete a conversation; returns whether anything was removed
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let state_key = state_key(id);
        let metadata_key = metadata_key(id);
        let removed = self
            .kv
            .delete(&[state_key.as_str(), metadata_key.as_str()])
            .await?;

        if removed > 0 {
            info!(conversation_id = %id, "Deleted conversation");
        }
        Ok(removed > 0)
    }

    /// Remove entries older than the TTL; returns the number of conversations removed
    pub async fn delete_expired(&self) -> Result<u64> {
        Ok(self.purge_expired().await?.len() as u64)
    }

    /// Remove entries older than the TTL, returning the ids of every
    /// conversation that lost its full record or its metadata
    pub async fn purge_expired(&self) -> Result<Vec<String>> {
        let states = self.kv.purge_expired(STATE_PREFIX).await?;
        let metadata = self.kv.purge_expired(METADATA_PREFIX).await?;

        if !states.is_empty() || !metadata.is_empty() {
            info!(
                "Removed {} expired conversations ({} metadata entries)",
                states.len(),
                metadata.len()
            );
        }

        let mut ids: Vec<String> = states
            .iter()
            .filter_map(|key| key.strip_prefix(STATE_PREFIX))
            .chain(
                metadata
                    .iter()
                    .filter_map(|key| key.strip_prefix(METADATA_PREFIX)),
            )
            .map(str::to_string)
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    /// Bulk invalidation of every key under a prefix
    pub async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        self.kv.delete_prefix(prefix).await
    }

    pub async fn close(&self) {
        self.kv.close().await;
    }
}
