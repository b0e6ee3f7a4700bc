// ABOUTME: Generation orchestrator driving analyze, generate, validate/repair and diff stages
// ABOUTME: Streams ordered events through a single-slot channel ending in one result or error

use futures::Stream;
use serde::{Deserialize, Serialize};
use specforge_ai::{ChatMessage, CompletionOptions, CompletionOracle};
use specforge_core::{
    generate_short_id, Config, ConversationMessage, ConversationState, ConversationStatus,
    GenerationMode, PendingDiff, WaitingFor,
};
use specforge_openapi::{ValidationOracle, ValidationReport};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::analyzer::{analyze, GenerationPreferences};
use crate::artifact::extract_artifact;
use crate::conversation_manager::{ConversationManager, ConversationUpdate, Suspension};
use crate::diff::{generate_change_summary, generate_diff};
use crate::error::{ErrorKind, GenerationError, Result};
use crate::events::{Stage, StreamEvent};
use crate::prompts::{create_prompt, modify_prompt, repair_prompt, SYSTEM_PROMPT};
use crate::quality::{assess_parsed, QualityReport};

/// Total validation attempts, the first generation included
pub const MAX_VALIDATION_ATTEMPTS: usize = 3;

pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Caller input settling a paused conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum CallerReply {
    ApproveDiff,
    RejectDiff,
    #[serde(rename_all = "camelCase")]
    Answer { question_id: String, answer: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    #[serde(default)]
    pub description: String,
    pub mode: GenerationMode,
    #[serde(default)]
    pub current_spec: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub template_hint: Option<String>,
    #[serde(default)]
    pub preferences: GenerationPreferences,
    #[serde(default)]
    pub reply: Option<CallerReply>,
}

impl GenerationRequest {
    pub fn create(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            mode: GenerationMode::Create,
            current_spec: None,
            conversation_id: None,
            template_hint: None,
            preferences: GenerationPreferences::default(),
            reply: None,
        }
    }

    pub fn modify(description: impl Into<String>, current_spec: impl Into<String>) -> Self {
        Self {
            mode: GenerationMode::Modify,
            current_spec: Some(current_spec.into()),
            ..Self::create(description)
        }
    }

    /// Continue an existing conversation
    pub fn continuing(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_reply(mut self, reply: CallerReply) -> Self {
        self.reply = Some(reply);
        self
    }

    pub fn with_preferences(mut self, preferences: GenerationPreferences) -> Self {
        self.preferences = preferences;
        self
    }

    pub fn with_template_hint(mut self, hint: impl Into<String>) -> Self {
        self.template_hint = Some(hint.into());
        self
    }
}

/// Completion parameters used by the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    pub max_tokens: u32,
    pub temperature: f32,
    pub repair_temperature: f32,
    pub model: Option<String>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            repair_temperature: config.repair_temperature,
            model: None,
        }
    }
}

/// Sends events to the consumer; fails once the run is cancelled or the consumer is gone
struct EventSink {
    tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
}

impl EventSink {
    async fn emit(&self, event: StreamEvent) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }
        self.tx
            .send(event)
            .await
            .map_err(|_| GenerationError::Cancelled)
    }

    async fn status(&self, stage: Stage, message: impl Into<String>) -> Result<()> {
        self.emit(StreamEvent::status(stage, message)).await
    }
}

/// Working state of one run once its conversation is resolved
struct Run {
    state: ConversationState,
    description: String,
    mode: GenerationMode,
    prior_spec: Option<String>,
    template_hint: Option<String>,
    preferences: GenerationPreferences,
}

#[derive(Clone)]
pub struct Orchestrator {
    manager: Arc<ConversationManager>,
    completion: Arc<dyn CompletionOracle>,
    validator: Arc<dyn ValidationOracle>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        manager: Arc<ConversationManager>,
        completion: Arc<dyn CompletionOracle>,
        validator: Arc<dyn ValidationOracle>,
    ) -> Self {
        Self {
            manager,
            completion,
            validator,
            settings: OrchestratorSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn manager(&self) -> &Arc<ConversationManager> {
        &self.manager
    }

    /// Run the pipeline for one request
    pub fn generate(&self, request: GenerationRequest) -> EventStream {
        self.generate_with_cancellation(request, CancellationToken::new())
    }

    /// Run the pipeline until it finishes or `cancel` fires.
    ///
    /// Cancellation ends the stream without a terminal event. Dropping the
    /// stream cancels the run as well.
    pub fn generate_with_cancellation(
        &self,
        request: GenerationRequest,
        cancel: CancellationToken,
    ) -> EventStream {
        // At most one event waits ahead of the consumer
        let (tx, mut rx) = mpsc::channel(1);
        let token = cancel.child_token();
        let guard = token.clone().drop_guard();

        let orchestrator = self.clone();
        let task_token = token.clone();
        tokio::spawn(async move {
            let sink = EventSink {
                tx,
                cancel: task_token.clone(),
            };
            tokio::select! {
                biased;
                _ = task_token.cancelled() => {
                    info!("Generation cancelled");
                }
                _ = orchestrator.drive(request, &sink) => {}
            }
        });

        Box::pin(async_stream::stream! {
            let _guard = guard;
            while let Some(event) = rx.recv().await {
                if token.is_cancelled() {
                    break;
                }
                yield event;
            }
        })
    }

    /// Run the pipeline and emit exactly one terminal event
    async fn drive(&self, request: GenerationRequest, sink: &EventSink) {
        let mut conversation_id = None;

        let terminal = match self.run(request, sink, &mut conversation_id).await {
            Ok(result) => result,
            Err(GenerationError::Cancelled) => return,
            Err(err) => {
                error!(
                    conversation_id = conversation_id.as_deref().unwrap_or("-"),
                    kind = %err.kind(),
                    "Generation failed: {}",
                    err
                );
                if let Some(id) = &conversation_id {
                    self.record_failure(id, &err).await;
                }
                StreamEvent::from(&err)
            }
        };

        if sink.emit(terminal).await.is_err() {
            debug!("Consumer went away before the terminal event");
        }
    }

    async fn record_failure(&self, id: &str, err: &GenerationError) {
        let pipeline_failure = matches!(
            err.kind(),
            ErrorKind::Configuration
                | ErrorKind::MalformedArtifact
                | ErrorKind::ValidationExhausted
                | ErrorKind::Oracle
        );
        if !pipeline_failure {
            return;
        }
        if let Err(e) = self.manager.error(id, &err.to_string()).await {
            warn!(conversation_id = %id, "Could not record generation failure: {}", e);
        }
    }

    async fn run(
        &self,
        request: GenerationRequest,
        sink: &EventSink,
        conversation_id: &mut Option<String>,
    ) -> Result<StreamEvent> {
        let run = match request.conversation_id.clone() {
            Some(id) => match self.continue_conversation(&id, request, sink).await? {
                Continuation::Settled(result) => return Ok(result),
                Continuation::Pipeline(run) => run,
            },
            None => self.start_conversation(request).await?,
        };

        *conversation_id = Some(run.state.id.clone());
        self.pipeline(run, sink).await
    }

    async fn start_conversation(&self, request: GenerationRequest) -> Result<Run> {
        if request.reply.is_some() {
            return Err(GenerationError::conflict(
                "(new)",
                "a reply needs the id of the paused conversation it answers",
            ));
        }

        let state = self
            .manager
            .create(
                request.mode,
                &request.description,
                request.current_spec.clone(),
            )
            .await?;

        Ok(Run {
            state,
            description: request.description,
            mode: request.mode,
            prior_spec: request.current_spec,
            template_hint: request.template_hint,
            preferences: request.preferences,
        })
    }

    async fn continue_conversation(
        &self,
        id: &str,
        request: GenerationRequest,
        sink: &EventSink,
    ) -> Result<Continuation> {
        let state = self
            .manager
            .get(id)
            .await?
            .ok_or_else(|| GenerationError::NotFound(id.to_string()))?;

        sink.emit(StreamEvent::Conversation {
            conversation_id: state.id.clone(),
            status: state.status,
            message_count: state.messages.len(),
        })
        .await?;

        if state.status.is_terminal() {
            return Err(GenerationError::terminal(id, state.status));
        }

        let mut preferences = request.preferences;
        let mut messages = Vec::new();

        match (state.status, state.waiting_for, request.reply) {
            (
                ConversationStatus::Paused,
                Some(WaitingFor::DiffApproval),
                Some(CallerReply::ApproveDiff),
            ) => {
                return Ok(Continuation::Settled(self.settle_diff(state, true).await?));
            }
            (
                ConversationStatus::Paused,
                Some(WaitingFor::DiffApproval),
                Some(CallerReply::RejectDiff),
            ) => {
                return Ok(Continuation::Settled(self.settle_diff(state, false).await?));
            }
            (
                ConversationStatus::Paused,
                Some(WaitingFor::QuestionAnswer),
                Some(CallerReply::Answer {
                    question_id,
                    answer,
                }),
            ) if state
                .pending_question
                .as_ref()
                .map(|q| q.id == question_id)
                .unwrap_or(false) =>
            {
                let question = state
                    .pending_question
                    .as_ref()
                    .map(|q| q.question.clone())
                    .unwrap_or_default();
                info!(conversation_id = %id, question_id = %question_id, "Received answer");
                preferences.notes.insert(question, answer.clone());
                messages.push(ConversationMessage::user(answer));
                self.manager.resume(id).await?;
            }
            (ConversationStatus::Paused, Some(waiting_for), _) => {
                return Err(GenerationError::awaiting(id, waiting_for));
            }
            (status, _, Some(_)) => {
                return Err(GenerationError::not_paused(id, status));
            }
            (_, _, None) => {}
        }

        let description = if request.description.trim().is_empty() {
            state.description.clone()
        } else {
            request.description
        };

        let mut context = state.context.clone();
        if messages.is_empty() {
            messages.push(ConversationMessage::user(description.clone()));
            context.previous_requests.push(description.clone());
        }

        let prior_spec = request.current_spec.or_else(|| state.current_spec.clone());
        let state = self
            .manager
            .update(
                id,
                ConversationUpdate {
                    description: Some(description.clone()),
                    messages,
                    context: Some(context),
                    ..Default::default()
                },
            )
            .await?
            .ok_or_else(|| GenerationError::NotFound(id.to_string()))?;

        Ok(Continuation::Pipeline(Run {
            state,
            description,
            mode: request.mode,
            prior_spec,
            template_hint: request.template_hint,
            preferences,
        }))
    }

    /// Apply or discard a pending diff without calling any oracle
    async fn settle_diff(&self, state: ConversationState, approved: bool) -> Result<StreamEvent> {
        let id = state.id.clone();
        let Some(pending) = state.pending_diff.clone() else {
            return Err(GenerationError::conflict(&id, "no diff is pending"));
        };

        self.manager.resume(&id).await?;

        let mut context = state.context.clone();
        let (spec, note) = if approved {
            context.applied_changes.push(pending.summary.clone());
            (pending.after, format!("Approved changes: {}", pending.summary))
        } else {
            (pending.before, format!("Rejected changes: {}", pending.summary))
        };

        self.manager
            .update(
                &id,
                ConversationUpdate {
                    current_spec: Some(spec.clone()),
                    messages: vec![ConversationMessage::user(note)],
                    context: Some(context),
                    ..Default::default()
                },
            )
            .await?;

        info!(conversation_id = %id, approved, "Settled pending diff");
        Ok(StreamEvent::Result {
            conversation_id: id,
            spec,
            quality: None,
            awaiting_approval: false,
        })
    }

    async fn pipeline(&self, run: Run, sink: &EventSink) -> Result<StreamEvent> {
        let Run {
            state,
            description,
            mode,
            prior_spec,
            template_hint,
            preferences,
        } = run;
        let id = state.id.clone();
        let mut context = state.context.clone();

        // Analyze
        sink.status(Stage::Analyzing, "Analyzing request").await?;
        let analysis = analyze(&description, template_hint.as_deref(), &preferences);
        let decisions = analysis.decisions();
        if !decisions.is_empty() {
            sink.emit(StreamEvent::Question {
                id: generate_short_id(),
                question: "Proceeding with these choices. Adjust preferences to change them."
                    .to_string(),
                options: vec!["continue".to_string()],
                default: Some("continue".to_string()),
                decisions,
                blocking: false,
            })
            .await?;
        }

        if let Some(template) = &analysis.template {
            context.template_used = Some(template.name.clone());
        }
        context
            .patterns_applied
            .extend(analysis.included_patterns().iter().map(|p| p.to_string()));
        context.user_preferences.extend(preferences.to_entries());

        // Generate
        let prior_spec = match mode {
            GenerationMode::Modify => prior_spec,
            GenerationMode::Create => None,
        };
        sink.status(Stage::Generating, "Generating specification").await?;
        let prompt = match &prior_spec {
            Some(current) => {
                let earlier: Vec<String> = context
                    .previous_requests
                    .iter()
                    .filter(|r| **r != description)
                    .cloned()
                    .collect();
                modify_prompt(&description, current, &earlier, &analysis, &preferences)
            }
            None => create_prompt(&description, &analysis, &preferences),
        };
        let raw = self.complete(prompt, self.settings.temperature).await?;
        let mut artifact = extract_artifact(&raw)?;

        // Validate and repair
        let report = self.validate_and_repair(&id, &mut artifact, sink).await?;

        let quality = report.parsed.as_ref().map(assess_parsed);
        if let Some(quality) = &quality {
            context.quality_scores.push(quality.total);
        }

        // Diff
        let mut note = describe_quality("Generated specification", quality.as_ref());
        let mut pending = None;
        if let Some(before) = prior_spec {
            sink.status(Stage::Diffing, "Comparing with the current specification")
                .await?;
            let diff = generate_diff(&before, &artifact);
            let summary = generate_change_summary(&diff);
            sink.emit(StreamEvent::Diff {
                added: diff.added.len(),
                removed: diff.removed.len(),
                modified: diff.modified.len(),
                summary: summary.clone(),
                preview: diff.preview,
            })
            .await?;

            note = describe_quality(&format!("Proposed changes: {}", summary), quality.as_ref());
            if preferences.require_diff_approval {
                pending = Some(PendingDiff {
                    before,
                    after: artifact.clone(),
                    summary,
                });
            } else {
                context.applied_changes.push(summary);
            }
        }

        let awaiting_approval = pending.is_some();
        match pending {
            Some(pending_diff) => {
                self.manager
                    .update(
                        &id,
                        ConversationUpdate {
                            messages: vec![ConversationMessage::assistant(note)],
                            context: Some(context),
                            ..Default::default()
                        },
                    )
                    .await?;
                self.manager
                    .pause(&id, Suspension::DiffApproval(pending_diff))
                    .await?;
                info!(conversation_id = %id, "Awaiting diff approval");
            }
            None => {
                self.manager
                    .update(
                        &id,
                        ConversationUpdate {
                            current_spec: Some(artifact.clone()),
                            messages: vec![ConversationMessage::assistant(note)],
                            context: Some(context),
                            ..Default::default()
                        },
                    )
                    .await?;
            }
        }

        info!(
            conversation_id = %id,
            quality = quality.as_ref().map(|q| q.total),
            awaiting_approval,
            "Generation finished"
        );
        Ok(StreamEvent::Result {
            conversation_id: id,
            spec: artifact,
            quality,
            awaiting_approval,
        })
    }

    /// Validate, asking for repairs until valid or out of attempts
    async fn validate_and_repair(
        &self,
        id: &str,
        artifact: &mut String,
        sink: &EventSink,
    ) -> Result<ValidationReport> {
        let mut attempt = 1;
        loop {
            sink.status(
                Stage::Validating,
                format!(
                    "Validating specification (attempt {} of {})",
                    attempt, MAX_VALIDATION_ATTEMPTS
                ),
            )
            .await?;

            let report = self.validator.validate(artifact).await;
            if report.valid {
                debug!(conversation_id = %id, attempt, "Specification is valid");
                return Ok(report);
            }

            if attempt >= MAX_VALIDATION_ATTEMPTS {
                return Err(GenerationError::ValidationExhausted {
                    attempts: attempt,
                    errors: report.errors,
                });
            }

            warn!(
                conversation_id = %id,
                attempt,
                errors = report.errors.len(),
                "Specification failed validation, requesting repair"
            );
            sink.status(
                Stage::Improving,
                format!("Fixing {} validation error(s)", report.errors.len()),
            )
            .await?;

            let raw = self
                .complete(
                    repair_prompt(artifact, &report.errors),
                    self.settings.repair_temperature,
                )
                .await?;
            *artifact = extract_artifact(&raw)?;
            attempt += 1;
        }
    }

    async fn complete(&self, prompt: String, temperature: f32) -> Result<String> {
        let messages = [ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)];
        let options = CompletionOptions {
            max_tokens: self.settings.max_tokens,
            temperature,
            model: self.settings.model.clone(),
        };

        let response = self.completion.complete(&messages, &options).await?;
        debug!(
            model = %response.model,
            tokens = ?response.tokens_used,
            finish_reason = ?response.finish_reason,
            "Completion finished"
        );
        Ok(response.content)
    }
}

enum Continuation {
    /// The reply settled the conversation without running the pipeline
    Settled(StreamEvent),
    Pipeline(Run),
}

fn describe_quality(prefix: &str, quality: Option<&QualityReport>) -> String {
    match quality {
        Some(q) => format!("{} (quality {}/100)", prefix, q.total),
        None => prefix.to_string(),
    }
}
