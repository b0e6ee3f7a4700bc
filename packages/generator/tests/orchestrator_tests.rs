// ABOUTME: End-to-end tests of the generation pipeline with scripted oracles
// ABOUTME: Covers event ordering, the repair loop bound, diffs, approvals, replies and cancellation

mod common;

use common::*;
use futures::StreamExt;
use pretty_assertions::assert_eq;
use specforge_core::{
    ConversationStatus, GenerationMode, MessageRole, PendingQuestion, WaitingFor,
};
use specforge_generator::{
    CallerReply, ErrorKind, GenerationPreferences, GenerationRequest, Stage, StreamEvent,
    Suspension, MAX_VALIDATION_ATTEMPTS,
};
use specforge_openapi::{OpenApiValidator, ValidationIssue};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn error_of(events: &[StreamEvent]) -> (ErrorKind, String, Vec<ValidationIssue>) {
    match events.last() {
        Some(StreamEvent::Error {
            kind,
            message,
            errors,
        }) => (*kind, message.clone(), errors.clone()),
        other => panic!("expected an error event, got {:?}", other),
    }
}

fn assert_single_terminal(events: &[StreamEvent]) {
    let terminals = events.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminals, 1, "events: {:?}", labels(events));
    assert!(events.last().map(StreamEvent::is_terminal).unwrap_or(false));
}

// ============================================================================
// Create flow
// ============================================================================

#[tokio::test]
async fn test_create_emits_exact_event_sequence() {
    let completion = ScriptedCompletion::texts(&[VALID_SPEC]);
    let orchestrator = orchestrator(completion.clone(), Arc::new(AlwaysValid)).await;

    let events = collect(orchestrator.generate(GenerationRequest::create(
        "A todo API with list and create endpoints",
    )))
    .await;

    assert_eq!(
        labels(&events),
        vec![
            "status:analyzing",
            "status:generating",
            "status:validating",
            "result"
        ]
    );
    let (id, spec) = result_of(&events);
    assert_eq!(spec, VALID_SPEC);
    assert_eq!(completion.call_count(), 1);

    let call = &completion.calls()[0];
    assert_eq!(call.temperature, 0.7);
    assert_eq!(call.max_tokens, 8000);
    assert_eq!(call.messages[0].role, MessageRole::System);
    assert!(call.messages[1]
        .content
        .contains("A todo API with list and create endpoints"));

    // Conversation stays active with the artifact recorded
    let state = orchestrator.manager().get(id).await.unwrap().unwrap();
    assert_eq!(state.status, ConversationStatus::Active);
    assert_eq!(state.current_spec.as_deref(), Some(VALID_SPEC));
    assert_eq!(state.messages.len(), 2);
    assert_eq!(state.messages[1].role, MessageRole::Assistant);
}

#[tokio::test]
async fn test_fenced_completion_is_unwrapped() {
    let fenced = format!("Here you go:\n```yaml\n{}```\n", VALID_SPEC);
    let completion = ScriptedCompletion::texts(&[&fenced]);
    let orchestrator = orchestrator(completion, Arc::new(AlwaysValid)).await;

    let events = collect(orchestrator.generate(GenerationRequest::create("A todo API"))).await;
    assert_eq!(result_of(&events).1, VALID_SPEC);
}

#[tokio::test]
async fn test_detected_patterns_emit_informational_question() {
    let completion = ScriptedCompletion::texts(&[VALID_SPEC]);
    let orchestrator = orchestrator(completion, Arc::new(AlwaysValid)).await;

    let events = collect(orchestrator.generate(GenerationRequest::create(
        "An online shop with paginated products and JWT login",
    )))
    .await;

    assert_eq!(
        labels(&events),
        vec![
            "status:analyzing",
            "question",
            "status:generating",
            "status:validating",
            "result"
        ]
    );
    match &events[1] {
        StreamEvent::Question {
            decisions,
            blocking,
            ..
        } => {
            assert!(!blocking);
            let topics: Vec<&str> = decisions.iter().map(|d| d.topic.as_str()).collect();
            assert_eq!(topics, vec!["template", "pagination", "authentication"]);
        }
        other => panic!("expected question, got {:?}", other),
    }

    let id = result_of(&events).0;
    let state = orchestrator.manager().get(id).await.unwrap().unwrap();
    assert_eq!(state.context.template_used.as_deref(), Some("ecommerce"));
    assert!(state.context.patterns_applied.contains("pagination"));
    assert!(state.context.patterns_applied.contains("authentication"));
    // Informational only: the conversation never pauses on it
    assert!(state.waiting_for.is_none());
}

#[tokio::test]
async fn test_quality_report_attached_when_validator_parses() {
    let completion = ScriptedCompletion::texts(&[VALID_SPEC]);
    let orchestrator = orchestrator(completion, Arc::new(OpenApiValidator::new())).await;

    let events = collect(orchestrator.generate(GenerationRequest::create("A todo API"))).await;

    let (id, quality) = match events.last() {
        Some(StreamEvent::Result {
            conversation_id,
            quality,
            ..
        }) => (conversation_id.clone(), quality.clone()),
        other => panic!("expected result, got {:?}", other),
    };
    let quality = quality.expect("quality report");
    assert!(quality.total <= 100);

    let state = orchestrator.manager().get(&id).await.unwrap().unwrap();
    assert_eq!(state.context.quality_scores, vec![quality.total]);
}

// ============================================================================
// Validate/repair loop
// ============================================================================

#[tokio::test]
async fn test_repair_loop_recovers_on_third_attempt() {
    let completion = ScriptedCompletion::texts(&[INVALID_SPEC, INVALID_SPEC, VALID_SPEC]);
    let orchestrator = orchestrator(completion.clone(), Arc::new(OpenApiValidator::new())).await;

    let events = collect(orchestrator.generate(GenerationRequest::create("A todo API"))).await;

    assert_eq!(
        labels(&events),
        vec![
            "status:analyzing",
            "status:generating",
            "status:validating",
            "status:improving",
            "status:validating",
            "status:improving",
            "status:validating",
            "result"
        ]
    );
    assert_eq!(result_of(&events).1, VALID_SPEC);

    let temperatures: Vec<f32> = completion.calls().iter().map(|c| c.temperature).collect();
    assert_eq!(temperatures, vec![0.7, 0.2, 0.2]);

    // Repair prompts carry the concrete errors
    let repair = &completion.calls()[1].messages[1].content;
    assert!(repair.contains("Missing required object 'paths' (at /paths)"));
    assert!(repair.contains(INVALID_SPEC));
}

#[tokio::test]
async fn test_repair_loop_is_bounded() {
    let issue = ValidationIssue::at("Operation GET /todos must declare at least one response", "/paths/~1todos/get/responses");
    let completion = ScriptedCompletion::texts(&[VALID_SPEC]);
    let orchestrator =
        orchestrator(completion.clone(), Arc::new(AlwaysInvalid(issue.clone()))).await;

    let events = collect(orchestrator.generate(GenerationRequest::create("A todo API"))).await;

    assert_eq!(completion.call_count(), MAX_VALIDATION_ATTEMPTS);
    assert_single_terminal(&events);

    let (kind, message, errors) = error_of(&events);
    assert_eq!(kind, ErrorKind::ValidationExhausted);
    assert_eq!(errors, vec![issue]);
    assert!(message.contains("/paths/~1todos/get/responses"));

    let improving = labels(&events)
        .iter()
        .filter(|l| *l == "status:improving")
        .count();
    assert_eq!(improving, MAX_VALIDATION_ATTEMPTS - 1);

    // The failure is recorded on the conversation
    let list = orchestrator.manager().list().await.unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].status, ConversationStatus::Error);
}

#[tokio::test]
async fn test_malformed_completion_fails_fast() {
    let completion = ScriptedCompletion::texts(&["I'm sorry, I can't produce that."]);
    let orchestrator = orchestrator(completion.clone(), Arc::new(AlwaysValid)).await;

    let events = collect(orchestrator.generate(GenerationRequest::create("A todo API"))).await;

    assert_eq!(
        labels(&events),
        vec!["status:analyzing", "status:generating", "error"]
    );
    assert_eq!(error_of(&events).0, ErrorKind::MalformedArtifact);
    assert_eq!(completion.call_count(), 1);
}

#[tokio::test]
async fn test_unconfigured_oracle_is_configuration_error() {
    let completion = ScriptedCompletion::missing_key();
    let orchestrator = orchestrator(completion, Arc::new(AlwaysValid)).await;

    let events = collect(orchestrator.generate(GenerationRequest::create("A todo API"))).await;

    let (kind, message, _) = error_of(&events);
    assert_eq!(kind, ErrorKind::Configuration);
    assert!(message.contains("ANTHROPIC_API_KEY"));
    assert_single_terminal(&events);
}

// ============================================================================
// Modify flow and diffs
// ============================================================================

#[tokio::test]
async fn test_modify_emits_diff_before_result() {
    let completion = ScriptedCompletion::texts(&[MODIFIED_SPEC]);
    let orchestrator = orchestrator(completion, Arc::new(AlwaysValid)).await;

    let events = collect(orchestrator.generate(GenerationRequest::modify(
        "Rename the API and add deletion",
        VALID_SPEC,
    )))
    .await;

    assert_eq!(
        labels(&events),
        vec![
            "status:analyzing",
            "status:generating",
            "status:validating",
            "status:diffing",
            "diff",
            "result"
        ]
    );
    match &events[4] {
        StreamEvent::Diff {
            added,
            removed,
            modified,
            summary,
            preview,
        } => {
            assert_eq!(*modified, 1);
            assert_eq!(*removed, 0);
            assert_eq!(*added, 6);
            assert_eq!(summary, "6 additions, 1 modification");
            assert!(preview.contains("+   title: Todo API v2"));
        }
        other => panic!("expected diff, got {:?}", other),
    }

    let (id, spec) = result_of(&events);
    assert_eq!(spec, MODIFIED_SPEC);
    let state = orchestrator.manager().get(id).await.unwrap().unwrap();
    assert_eq!(state.mode, GenerationMode::Modify);
    assert_eq!(state.current_spec.as_deref(), Some(MODIFIED_SPEC));
    assert_eq!(
        state.context.applied_changes,
        vec!["6 additions, 1 modification"]
    );
}

fn approval_preferences() -> GenerationPreferences {
    GenerationPreferences {
        require_diff_approval: true,
        ..Default::default()
    }
}

async fn paused_on_diff() -> (Arc<ScriptedCompletion>, specforge_generator::Orchestrator, String) {
    let completion = ScriptedCompletion::texts(&[MODIFIED_SPEC]);
    let orchestrator = orchestrator(completion.clone(), Arc::new(AlwaysValid)).await;

    let events = collect(
        orchestrator.generate(
            GenerationRequest::modify("Rename the API", VALID_SPEC)
                .with_preferences(approval_preferences()),
        ),
    )
    .await;

    let id = match events.last() {
        Some(StreamEvent::Result {
            conversation_id,
            awaiting_approval,
            spec,
            ..
        }) => {
            assert!(*awaiting_approval);
            assert_eq!(spec, MODIFIED_SPEC);
            conversation_id.clone()
        }
        other => panic!("expected result, got {:?}", other),
    };
    (completion, orchestrator, id)
}

#[tokio::test]
async fn test_diff_approval_pauses_with_value_copies() {
    let (_, orchestrator, id) = paused_on_diff().await;

    let state = orchestrator.manager().get(&id).await.unwrap().unwrap();
    assert_eq!(state.status, ConversationStatus::Paused);
    assert_eq!(state.waiting_for, Some(WaitingFor::DiffApproval));
    assert!(state.is_consistent());

    let pending = state.pending_diff.unwrap();
    assert_eq!(pending.before, VALID_SPEC);
    assert_eq!(pending.after, MODIFIED_SPEC);
    // Not applied until approved
    assert_eq!(state.current_spec.as_deref(), Some(VALID_SPEC));
    assert!(state.context.applied_changes.is_empty());
    let note = &state.messages.last().unwrap().content;
    assert!(note.starts_with("Proposed changes: 6 additions, 1 modification"), "{}", note);
}

#[tokio::test]
async fn test_approving_diff_applies_it_without_oracle_calls() {
    let (completion, orchestrator, id) = paused_on_diff().await;

    let events = collect(
        orchestrator.generate(
            GenerationRequest::modify("", VALID_SPEC)
                .continuing(&id)
                .with_reply(CallerReply::ApproveDiff),
        ),
    )
    .await;

    assert_eq!(labels(&events), vec!["conversation", "result"]);
    assert_eq!(result_of(&events).1, MODIFIED_SPEC);
    assert_eq!(completion.call_count(), 1);

    let state = orchestrator.manager().get(&id).await.unwrap().unwrap();
    assert_eq!(state.status, ConversationStatus::Active);
    assert!(state.pending_diff.is_none());
    assert_eq!(state.current_spec.as_deref(), Some(MODIFIED_SPEC));
    assert_eq!(state.context.applied_changes.len(), 1);
}

#[tokio::test]
async fn test_rejecting_diff_keeps_previous_spec() {
    let (completion, orchestrator, id) = paused_on_diff().await;

    let events = collect(
        orchestrator.generate(
            GenerationRequest::modify("", VALID_SPEC)
                .continuing(&id)
                .with_reply(CallerReply::RejectDiff),
        ),
    )
    .await;

    assert_eq!(result_of(&events).1, VALID_SPEC);
    assert_eq!(completion.call_count(), 1);

    let state = orchestrator.manager().get(&id).await.unwrap().unwrap();
    assert_eq!(state.status, ConversationStatus::Active);
    assert_eq!(state.current_spec.as_deref(), Some(VALID_SPEC));
    assert!(state.context.applied_changes.is_empty());
}

// ============================================================================
// Continuations and conflicts
// ============================================================================

#[tokio::test]
async fn test_continuing_conversation_emits_conversation_event_first() {
    let completion = ScriptedCompletion::texts(&[VALID_SPEC, MODIFIED_SPEC]);
    let orchestrator = orchestrator(completion.clone(), Arc::new(AlwaysValid)).await;

    let first = collect(orchestrator.generate(GenerationRequest::create("A todo API"))).await;
    let id = result_of(&first).0.to_string();

    let second = collect(orchestrator.generate(
        GenerationRequest {
            mode: GenerationMode::Modify,
            ..GenerationRequest::create("Add deletion")
        }
        .continuing(&id),
    ))
    .await;

    assert_eq!(labels(&second)[0], "conversation");
    match &second[0] {
        StreamEvent::Conversation {
            conversation_id,
            status,
            message_count,
        } => {
            assert_eq!(conversation_id, &id);
            assert_eq!(*status, ConversationStatus::Active);
            assert_eq!(*message_count, 2);
        }
        other => panic!("expected conversation event, got {:?}", other),
    }
    // The stored spec is the prior artifact for the diff
    assert!(labels(&second).contains(&"diff".to_string()));
    assert_eq!(result_of(&second).1, MODIFIED_SPEC);

    // Earlier requests feed the modify prompt
    let prompt = &completion.calls()[1].messages[1].content;
    assert!(prompt.contains("- A todo API"));

    let state = orchestrator.manager().get(&id).await.unwrap().unwrap();
    assert_eq!(state.context.previous_requests, vec!["A todo API", "Add deletion"]);
}

#[tokio::test]
async fn test_unknown_conversation_is_not_found() {
    let completion = ScriptedCompletion::texts(&[VALID_SPEC]);
    let orchestrator = orchestrator(completion.clone(), Arc::new(AlwaysValid)).await;

    let events = collect(
        orchestrator.generate(GenerationRequest::create("A todo API").continuing("conv_nope")),
    )
    .await;

    assert_eq!(labels(&events), vec!["error"]);
    assert_eq!(error_of(&events).0, ErrorKind::NotFound);
    assert_eq!(completion.call_count(), 0);
}

#[tokio::test]
async fn test_paused_conversation_requires_matching_reply() {
    let (completion, orchestrator, id) = paused_on_diff().await;

    let missing = collect(
        orchestrator.generate(GenerationRequest::create("More changes").continuing(&id)),
    )
    .await;
    assert_eq!(labels(&missing), vec!["conversation", "error"]);
    assert_eq!(error_of(&missing).0, ErrorKind::StateConflict);

    let wrong = collect(
        orchestrator.generate(
            GenerationRequest::create("")
                .continuing(&id)
                .with_reply(CallerReply::Answer {
                    question_id: "q1".to_string(),
                    answer: "yes".to_string(),
                }),
        ),
    )
    .await;
    assert_eq!(error_of(&wrong).0, ErrorKind::StateConflict);

    // Conflicts leave the checkpoint untouched
    let state = orchestrator.manager().get(&id).await.unwrap().unwrap();
    assert_eq!(state.status, ConversationStatus::Paused);
    assert!(state.pending_diff.is_some());
    assert_eq!(completion.call_count(), 1);
}

#[tokio::test]
async fn test_reply_to_active_conversation_is_conflict() {
    let completion = ScriptedCompletion::texts(&[VALID_SPEC]);
    let orchestrator = orchestrator(completion, Arc::new(AlwaysValid)).await;

    let first = collect(orchestrator.generate(GenerationRequest::create("A todo API"))).await;
    let id = result_of(&first).0.to_string();

    let events = collect(
        orchestrator.generate(
            GenerationRequest::create("")
                .continuing(&id)
                .with_reply(CallerReply::ApproveDiff),
        ),
    )
    .await;

    let (kind, message, _) = error_of(&events);
    assert_eq!(kind, ErrorKind::StateConflict);
    assert!(message.contains("rather than paused"));
}

#[tokio::test]
async fn test_answering_question_resumes_pipeline() {
    let completion = ScriptedCompletion::texts(&[VALID_SPEC]);
    let orchestrator = orchestrator(completion.clone(), Arc::new(AlwaysValid)).await;
    let manager = orchestrator.manager().clone();

    let state = manager
        .create(GenerationMode::Create, "A todo API", None)
        .await
        .unwrap();
    manager
        .pause(
            &state.id,
            Suspension::Question(PendingQuestion {
                id: "auth".to_string(),
                question: "Which authentication scheme?".to_string(),
                options: vec!["bearer".to_string(), "api key".to_string()],
                default: Some("bearer".to_string()),
            }),
        )
        .await
        .unwrap();

    let events = collect(
        orchestrator.generate(
            GenerationRequest::create("")
                .continuing(&state.id)
                .with_reply(CallerReply::Answer {
                    question_id: "auth".to_string(),
                    answer: "bearer".to_string(),
                }),
        ),
    )
    .await;

    assert_eq!(labels(&events)[0], "conversation");
    assert_eq!(result_of(&events).1, VALID_SPEC);

    let prompt = &completion.calls()[0].messages[1].content;
    assert!(prompt.contains("Which authentication scheme?: bearer"));
    assert!(prompt.contains("A todo API"));

    let state = manager.get(&state.id).await.unwrap().unwrap();
    assert_eq!(state.status, ConversationStatus::Active);
    assert!(state.pending_question.is_none());
    assert!(state
        .messages
        .iter()
        .any(|m| m.role == MessageRole::User && m.content == "bearer"));
    assert_eq!(
        state
            .context
            .user_preferences
            .get("Which authentication scheme?")
            .map(String::as_str),
        Some("bearer")
    );
}

#[tokio::test]
async fn test_terminal_conversation_rejects_new_requests() {
    let completion = ScriptedCompletion::texts(&[VALID_SPEC]);
    let orchestrator = orchestrator(completion, Arc::new(AlwaysValid)).await;
    let manager = orchestrator.manager().clone();

    let state = manager
        .create(GenerationMode::Create, "A todo API", None)
        .await
        .unwrap();
    manager.complete(&state.id, None).await.unwrap();

    let events = collect(
        orchestrator.generate(GenerationRequest::create("More").continuing(&state.id)),
    )
    .await;
    assert_eq!(labels(&events), vec!["conversation", "error"]);
    assert_eq!(error_of(&events).0, ErrorKind::StateConflict);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_cancellation_stops_stream_without_terminal_event() {
    let completion = ScriptedCompletion::hanging();
    let orchestrator = orchestrator(completion.clone(), Arc::new(AlwaysValid)).await;
    let cancel = CancellationToken::new();

    let mut stream = orchestrator
        .generate_with_cancellation(GenerationRequest::create("A todo API"), cancel.clone());

    let mut seen = Vec::new();
    for _ in 0..2 {
        seen.push(stream.next().await.unwrap());
    }
    assert_eq!(labels(&seen), vec!["status:analyzing", "status:generating"]);

    completion.started.notified().await;
    cancel.cancel();

    let rest = tokio::time::timeout(Duration::from_secs(5), stream.collect::<Vec<_>>())
        .await
        .expect("stream ends after cancellation");
    assert!(rest.is_empty(), "unexpected events: {:?}", labels(&rest));
    assert_eq!(completion.call_count(), 1);
}

#[tokio::test]
async fn test_stage_labels_match_wire_names() {
    assert_eq!(Stage::Improving.to_string(), "improving");
}
