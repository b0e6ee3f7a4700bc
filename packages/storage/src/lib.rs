// ABOUTME: Durable conversation persistence for specforge
// ABOUTME: SQLite key/value namespaces with TTL-based expiry and bulk invalidation

pub mod conversations;
pub mod kv;

use thiserror::Error;

pub use conversations::{metadata_key, state_key, ConversationStore, METADATA_PREFIX, STATE_PREFIX};
pub use kv::KvStore;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;
