// ABOUTME: Scripted oracle stubs and helpers shared by generator integration tests
// ABOUTME: Records completion calls and builds orchestrators over an in-memory store

#![allow(dead_code)]

use async_trait::async_trait;
use futures::StreamExt;
use specforge_ai::{
    AIServiceError, AIServiceResult, ChatMessage, CompletionOptions, CompletionOracle,
    CompletionResponse,
};
use specforge_generator::{
    ConversationManager, EventStream, Orchestrator, StreamEvent,
};
use specforge_openapi::{ValidationIssue, ValidationOracle, ValidationReport};
use specforge_storage::ConversationStore;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub const DAY: Duration = Duration::from_secs(24 * 3600);

pub const VALID_SPEC: &str = "openapi: 3.0.3
info:
  title: Todo API
  version: 1.0.0
paths:
  /todos:
    get:
      operationId: listTodos
      summary: List todos
      responses:
        '200':
          description: ok
    post:
      operationId: createTodo
      summary: Create a todo
      responses:
        '201':
          description: created
";

/// Same API with a changed title and an extra operation
pub const MODIFIED_SPEC: &str = "openapi: 3.0.3
info:
  title: Todo API v2
  version: 1.0.0
paths:
  /todos:
    get:
      operationId: listTodos
      summary: List todos
      responses:
        '200':
          description: ok
    post:
      operationId: createTodo
      summary: Create a todo
      responses:
        '201':
          description: created
  /todos/{id}:
    delete:
      operationId: deleteTodo
      responses:
        '204':
          description: deleted
";

/// Parses but has no paths
pub const INVALID_SPEC: &str = "openapi: 3.0.3
info:
  title: Todo API
  version: 1.0.0
";

// ============================================================================
// Completion oracle stub
// ============================================================================

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

enum Reply {
    Text(String),
    MissingKey,
    /// Never resolves until released
    Hang,
}

/// Completion oracle returning scripted replies in order; the last reply repeats
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<Reply>>,
    last: Mutex<Option<String>>,
    calls: Mutex<Vec<RecordedCall>>,
    pub started: Notify,
}

impl ScriptedCompletion {
    fn with(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            last: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            started: Notify::new(),
        })
    }

    pub fn texts(texts: &[&str]) -> Arc<Self> {
        Self::with(texts.iter().map(|t| Reply::Text(t.to_string())).collect())
    }

    pub fn missing_key() -> Arc<Self> {
        Self::with(vec![Reply::MissingKey])
    }

    pub fn hanging() -> Arc<Self> {
        Self::with(vec![Reply::Hang])
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionOracle for ScriptedCompletion {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> AIServiceResult<CompletionResponse> {
        self.calls.lock().unwrap().push(RecordedCall {
            messages: messages.to_vec(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        });
        self.started.notify_one();

        let next = self.replies.lock().unwrap().pop_front();
        let text = match next {
            Some(Reply::Text(text)) => {
                *self.last.lock().unwrap() = Some(text.clone());
                text
            }
            Some(Reply::MissingKey) => return Err(AIServiceError::NoApiKey),
            Some(Reply::Hang) => {
                futures::future::pending::<()>().await;
                unreachable!()
            }
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .expect("no scripted completion left"),
        };

        Ok(CompletionResponse {
            content: text,
            model: "stub-model".to_string(),
            tokens_used: Some(42),
            finish_reason: Some("end_turn".to_string()),
        })
    }
}

// ============================================================================
// Validation oracle stubs
// ============================================================================

/// Reports every artifact valid, without a parsed tree
pub struct AlwaysValid;

#[async_trait]
impl ValidationOracle for AlwaysValid {
    async fn validate(&self, _artifact: &str) -> ValidationReport {
        ValidationReport::valid(None)
    }
}

/// Reports the same single error for every artifact
pub struct AlwaysInvalid(pub ValidationIssue);

#[async_trait]
impl ValidationOracle for AlwaysInvalid {
    async fn validate(&self, _artifact: &str) -> ValidationReport {
        ValidationReport::invalid(vec![self.0.clone()], None)
    }
}

// ============================================================================
// Helpers
// ============================================================================

pub async fn manager() -> Arc<ConversationManager> {
    Arc::new(ConversationManager::new(
        ConversationStore::in_memory(DAY).await.unwrap(),
    ))
}

pub async fn orchestrator(
    completion: Arc<ScriptedCompletion>,
    validator: Arc<dyn ValidationOracle>,
) -> Orchestrator {
    Orchestrator::new(manager().await, completion, validator)
}

pub async fn collect(stream: EventStream) -> Vec<StreamEvent> {
    stream.collect().await
}

/// `status:<stage>` for status events, the event type otherwise
pub fn labels(events: &[StreamEvent]) -> Vec<String> {
    events
        .iter()
        .map(|event| match event {
            StreamEvent::Status { stage, .. } => format!("status:{}", stage),
            other => other.event_type().to_string(),
        })
        .collect()
}

pub fn result_of(events: &[StreamEvent]) -> (&str, &str) {
    match events.last() {
        Some(StreamEvent::Result {
            conversation_id,
            spec,
            ..
        }) => (conversation_id.as_str(), spec.as_str()),
        other => panic!("expected a result event, got {:?}", other),
    }
}
