// ABOUTME: Conversation lifecycle facade with an in-memory cache over the durable store
// ABOUTME: Enforces the pause/resume/terminal state machine and runs the periodic expiry sweep

use chrono::{DateTime, Utc};
use specforge_core::{
    generate_conversation_id, ConversationContext, ConversationMessage, ConversationMetadata,
    ConversationState, ConversationStatus, GenerationMode, PendingDiff, PendingQuestion,
    WaitingFor,
};
use specforge_storage::{metadata_key, state_key, ConversationStore};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::error::{GenerationError, Result};
use crate::scheduler::PeriodicTask;

/// Why a conversation is being paused, with the payload the caller must act on
#[derive(Debug, Clone, PartialEq)]
pub enum Suspension {
    Question(PendingQuestion),
    DiffApproval(PendingDiff),
}

impl Suspension {
    pub fn waiting_for(&self) -> WaitingFor {
        match self {
            Self::Question(_) => WaitingFor::QuestionAnswer,
            Self::DiffApproval(_) => WaitingFor::DiffApproval,
        }
    }
}

/// Field changes merged by [`ConversationManager::update`].
///
/// Messages are appended; the other fields replace their current values
/// when set.
#[derive(Debug, Clone, Default)]
pub struct ConversationUpdate {
    pub description: Option<String>,
    pub current_spec: Option<String>,
    pub messages: Vec<ConversationMessage>,
    pub context: Option<ConversationContext>,
}

/// Outcome of one cleanup sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub expired_conversations: u64,
    pub evicted_from_cache: usize,
}

pub struct ConversationManager {
    store: ConversationStore,
    cache: RwLock<HashMap<String, ConversationState>>,
    ttl: chrono::Duration,
    cleanup_task: Mutex<Option<PeriodicTask>>,
}

impl ConversationManager {
    pub fn new(store: ConversationStore) -> Self {
        let ttl = chrono::Duration::from_std(store.ttl()).unwrap_or(chrono::Duration::MAX);
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
            ttl,
            cleanup_task: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    fn is_expired(&self, state: &ConversationState, now: DateTime<Utc>) -> bool {
        state
            .updated_at
            .checked_add_signed(self.ttl)
            .map(|expires| expires <= now)
            .unwrap_or(false)
    }

    async fn persist(&self, state: &ConversationState) -> Result<()> {
        self.store.save(state).await?;
        self.cache
            .write()
            .await
            .insert(state.id.clone(), state.clone());
        Ok(())
    }

    /// Start a new active conversation
    pub async fn create(
        &self,
        mode: GenerationMode,
        description: &str,
        existing_spec: Option<String>,
    ) -> Result<ConversationState> {
        let now = Utc::now();
        let state = ConversationState {
            id: generate_conversation_id(),
            mode,
            description: description.to_string(),
            current_spec: existing_spec,
            messages: vec![ConversationMessage::user(description)],
            status: ConversationStatus::Active,
            waiting_for: None,
            pending_question: None,
            pending_diff: None,
            context: ConversationContext {
                previous_requests: vec![description.to_string()],
                ..Default::default()
            },
            created_at: now,
            updated_at: now,
        };

        self.persist(&state).await?;
        info!(conversation_id = %state.id, mode = %mode, "Created conversation");
        Ok(state)
    }

    /// Fetch a conversation, preferring the in-memory copy
    pub async fn get(&self, id: &str) -> Result<Option<ConversationState>> {
        let now = Utc::now();
        {
            let cache = self.cache.read().await;
            if let Some(state) = cache.get(id) {
                if !self.is_expired(state, now) {
                    return Ok(Some(state.clone()));
                }
            }
        }

        match self.store.load(id).await? {
            Some(state) => {
                debug!(conversation_id = %id, "Loaded conversation from store");
                self.cache
                    .write()
                    .await
                    .insert(state.id.clone(), state.clone());
                Ok(Some(state))
            }
            None => {
                self.cache.write().await.remove(id);
                Ok(None)
            }
        }
    }

    async fn require(&self, id: &str) -> Result<ConversationState> {
        self.get(id)
            .await?
            .ok_or_else(|| GenerationError::NotFound(id.to_string()))
    }

    /// Apply `change` to a copy of the live record, then persist it
    async fn mutate<F>(&self, mut state: ConversationState, change: F) -> Result<ConversationState>
    where
        F: FnOnce(&mut ConversationState) -> Result<()>,
    {
        change(&mut state)?;
        state.updated_at = Utc::now();
        debug_assert!(state.is_consistent());
        self.persist(&state).await?;
        Ok(state)
    }

    /// Merge field changes; returns `None` when the conversation does not exist
    pub async fn update(
        &self,
        id: &str,
        update: ConversationUpdate,
    ) -> Result<Option<ConversationState>> {
        let Some(state) = self.get(id).await? else {
            return Ok(None);
        };

        let state = self
            .mutate(state, |state| {
                if state.status.is_terminal() {
                    return Err(GenerationError::terminal(&state.id, state.status));
                }
                if let Some(description) = update.description {
                    state.description = description;
                }
                if let Some(spec) = update.current_spec {
                    state.current_spec = Some(spec);
                }
                if let Some(context) = update.context {
                    state.context = context;
                }
                state.messages.extend(update.messages);
                Ok(())
            })
            .await?;

        Ok(Some(state))
    }

    /// Pause an active conversation on a question or a diff awaiting approval
    pub async fn pause(&self, id: &str, suspension: Suspension) -> Result<ConversationState> {
        let state = self.require(id).await?;
        let waiting_for = suspension.waiting_for();

        let state = self
            .mutate(state, |state| {
                match state.status {
                    ConversationStatus::Active => {}
                    ConversationStatus::Paused => {
                        return Err(GenerationError::conflict(
                            &state.id,
                            "it is already paused; resume it before pausing again",
                        ))
                    }
                    status => return Err(GenerationError::terminal(&state.id, status)),
                }

                state.status = ConversationStatus::Paused;
                state.waiting_for = Some(waiting_for);
                match suspension {
                    Suspension::Question(question) => state.pending_question = Some(question),
                    Suspension::DiffApproval(diff) => state.pending_diff = Some(diff),
                }
                Ok(())
            })
            .await?;

        info!(conversation_id = %id, waiting_for = %waiting_for, "Paused conversation");
        Ok(state)
    }

    /// Clear pending checkpoints and return a paused conversation to active
    pub async fn resume(&self, id: &str) -> Result<ConversationState> {
        let state = self.require(id).await?;

        let state = self
            .mutate(state, |state| {
                if state.status != ConversationStatus::Paused {
                    return Err(GenerationError::not_paused(&state.id, state.status));
                }
                clear_suspension(state);
                state.status = ConversationStatus::Active;
                Ok(())
            })
            .await?;

        info!(conversation_id = %id, "Resumed conversation");
        Ok(state)
    }

    /// Mark a conversation completed, optionally recording the final artifact
    pub async fn complete(&self, id: &str, final_spec: Option<String>) -> Result<ConversationState> {
        let state = self.require(id).await?;

        let state = self
            .mutate(state, |state| {
                if state.status.is_terminal() {
                    return Err(GenerationError::terminal(&state.id, state.status));
                }
                clear_suspension(state);
                if let Some(spec) = final_spec {
                    state.current_spec = Some(spec);
                }
                state.status = ConversationStatus::Completed;
                Ok(())
            })
            .await?;

        info!(conversation_id = %id, "Completed conversation");
        Ok(state)
    }

    /// Mark a conversation failed, recording the reason as a system message
    pub async fn error(&self, id: &str, message: &str) -> Result<ConversationState> {
        let state = self.require(id).await?;

        let state = self
            .mutate(state, |state| {
                if state.status.is_terminal() {
                    return Err(GenerationError::terminal(&state.id, state.status));
                }
                clear_suspension(state);
                state.messages.push(ConversationMessage::system(message));
                state.status = ConversationStatus::Error;
                Ok(())
            })
            .await?;

        warn!(conversation_id = %id, "Conversation failed: {}", message);
        Ok(state)
    }

    /// Hard-delete a conversation from memory and storage
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let cached = self.cache.write().await.remove(id).is_some();
        let stored = self.store.delete(id).await?;
        Ok(cached || stored)
    }

    /// Delete every stored key under `prefix` and drop the cached
    /// conversations whose keys it covers; returns the stored rows removed
    pub async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        let removed = self.store.delete_prefix(prefix).await?;

        let mut cache = self.cache.write().await;
        cache.retain(|id, _| {
            !(state_key(id).starts_with(prefix) || metadata_key(id).starts_with(prefix))
        });
        drop(cache);

        info!(prefix, removed, "Deleted conversation keys by prefix");
        Ok(removed)
    }

    /// Listing metadata, most recently updated first
    pub async fn list(&self) -> Result<Vec<ConversationMetadata>> {
        Ok(self.store.list_metadata().await?)
    }

    /// Sweep expired records from storage and idle entries from memory
    pub async fn cleanup(&self) -> Result<CleanupStats> {
        let expired_ids = self.store.purge_expired().await?;

        let now = Utc::now();
        let mut cache = self.cache.write().await;
        let before = cache.len();
        for id in &expired_ids {
            cache.remove(id);
        }
        cache.retain(|_, state| !self.is_expired(state, now));
        let evicted_from_cache = before - cache.len();
        drop(cache);

        let stats = CleanupStats {
            expired_conversations: expired_ids.len() as u64,
            evicted_from_cache,
        };
        if stats != CleanupStats::default() {
            info!(
                "Conversation cleanup removed {} expired records and evicted {} cached entries",
                stats.expired_conversations, stats.evicted_from_cache
            );
        }
        Ok(stats)
    }

    /// Start the periodic cleanup task; returns false if it is already running
    pub async fn start_cleanup(self: &Arc<Self>, interval: Duration) -> bool {
        let mut slot = self.cleanup_task.lock().await;
        if slot.as_ref().map(PeriodicTask::is_running).unwrap_or(false) {
            debug!("Conversation cleanup task already running");
            return false;
        }

        let manager: Weak<Self> = Arc::downgrade(self);
        *slot = Some(PeriodicTask::spawn(
            "conversation cleanup",
            interval,
            move || {
                let manager = manager.clone();
                async move {
                    let Some(manager) = manager.upgrade() else {
                        return;
                    };
                    if let Err(e) = manager.cleanup().await {
                        error!("Conversation cleanup failed: {}", e);
                    }
                }
            },
        ));
        true
    }

    pub async fn is_cleanup_running(&self) -> bool {
        self.cleanup_task
            .lock()
            .await
            .as_ref()
            .map(PeriodicTask::is_running)
            .unwrap_or(false)
    }

    /// Stop the cleanup task and wait for it to exit; safe to call repeatedly
    pub async fn stop_cleanup(&self) {
        let task = self.cleanup_task.lock().await.take();
        if let Some(task) = task {
            task.stop().await;
        }
    }

    /// Stop background work and close the store
    pub async fn shutdown(&self) {
        self.stop_cleanup().await;
        self.cache.write().await.clear();
        self.store.close().await;
        info!("Conversation manager shut down");
    }

    /// Drop every in-memory entry; later reads fall through to the store
    pub async fn invalidate_cache(&self) {
        self.cache.write().await.clear();
    }
}

fn clear_suspension(state: &mut ConversationState) {
    state.waiting_for = None;
    state.pending_question = None;
    state.pending_diff = None;
}
