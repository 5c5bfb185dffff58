use std::sync::Arc;

use crate::mock_provider::MockProvider;
use crate::orchestrator_with;
use steward::agent::{ConversationRequest, Intent, Scope};
use steward::llm::{DisabledProvider, ProviderResponse};
use steward::store::InMemoryStore;

fn request(message: &str) -> ConversationRequest {
    ConversationRequest {
        scope: Scope::global("u1"),
        message: message.to_string(),
        history: Vec::new(),
        date: chrono::NaiveDate::from_ymd_opt(2026, 3, 2),
    }
}

// Empty history, disabled model: the heuristic classifies and the reply is
// the disabled-service warning, with nothing retrieved or proposed.
#[tokio::test]
async fn disabled_services_end_to_end() {
    let store = Arc::new(InMemoryStore::new());
    let (orchestrator, _) = orchestrator_with(Arc::new(DisabledProvider), store);

    let result = orchestrator.run(&request("status update please"), None).await;
    assert_eq!(result.intent, Intent::Status);
    assert!(result.reply.contains("not configured"));
    assert!(result.references.is_empty());
    assert!(result.proposals.is_empty());
    assert!(!result.guardrails.input_tripwire);
    assert!(!result.guardrails.output_tripwire);
}

#[tokio::test]
async fn heuristic_intents_with_disabled_model() {
    let store = Arc::new(InMemoryStore::new());
    let (orchestrator, _) = orchestrator_with(Arc::new(DisabledProvider), store);

    let cases = [
        ("What's my status on this?", Intent::Status),
        ("build me a plan", Intent::Plan),
        ("what's on my todo list", Intent::TaskQuery),
        ("daily digest please", Intent::DailyDigest),
        ("prep me for the 3pm meeting", Intent::MeetingPrep),
        ("tell me a joke", Intent::GeneralQ),
    ];
    for (message, expected) in cases {
        let result = orchestrator.run(&request(message), None).await;
        assert_eq!(result.intent, expected, "message: {message}");
    }
}

#[tokio::test]
async fn input_tripwire_returns_verdict_and_nothing_else() {
    let provider = MockProvider::new(
        vec![r#"{"tripwire": true, "message": "blocked by policy", "intent": "general_q"}"#],
        vec![],
    );
    let store = Arc::new(InMemoryStore::new());
    let (orchestrator, _) = orchestrator_with(Arc::new(provider), store);

    let result = orchestrator.run(&request("do the bad thing"), None).await;
    assert!(result.guardrails.input_tripwire);
    assert_eq!(result.reply, "blocked by policy");
    assert!(result.references.is_empty());
    assert!(result.proposals.is_empty());
}

#[tokio::test]
async fn classifier_outage_fails_open_and_turn_completes() {
    // Guardrail script is empty, so both classifier calls error out. The
    // turn must still produce the model's reply.
    let provider = MockProvider::new(
        vec![],
        vec![ProviderResponse::text_only("## Summary\nstill here")],
    );
    let store = Arc::new(InMemoryStore::new());
    let (orchestrator, _) = orchestrator_with(Arc::new(provider), store);

    let result = orchestrator.run(&request("plan my week"), None).await;
    assert!(!result.guardrails.input_tripwire);
    assert!(!result.guardrails.output_tripwire);
    assert_eq!(result.intent, Intent::Plan);
    assert_eq!(result.reply, "## Summary\nstill here");
}

#[tokio::test]
async fn output_tripwire_falls_back_but_keeps_progress() {
    let provider = MockProvider::new(
        vec![
            r#"{"tripwire": false, "intent": "status"}"#,
            r#"{"tripwire": true, "message": "unsupported claims"}"#,
        ],
        vec![ProviderResponse::text_only("fabricated nonsense")],
    );
    let store = Arc::new(InMemoryStore::new());
    let (orchestrator, _) = orchestrator_with(Arc::new(provider), store);

    let result = orchestrator.run(&request("status?"), None).await;
    assert!(result.guardrails.output_tripwire);
    assert_eq!(result.reply, "unsupported claims");
    assert_eq!(result.intent, Intent::Status);
}
