use std::sync::Arc;
use std::time::Duration;

use crate::mock_provider::{MockProvider, ALLOW_VERDICT, PASS_VERDICT};
use crate::orchestrator_with;
use futures_util::StreamExt;
use steward::agent::{ConversationRequest, Scope};
use steward::llm::ProviderResponse;
use steward::store::InMemoryStore;
use steward::transport::{stream_turn, TransportEvent};

fn request() -> ConversationRequest {
    ConversationRequest {
        scope: Scope::global("u1"),
        message: "how are things looking?".into(),
        history: Vec::new(),
        date: chrono::NaiveDate::from_ymd_opt(2026, 3, 2),
    }
}

#[tokio::test]
async fn slow_turn_emits_keepalives_then_chunks_then_final() {
    let reply = "## Summary\nEverything is on track for the week.";
    let provider = MockProvider::new(
        vec![ALLOW_VERDICT, PASS_VERDICT],
        vec![ProviderResponse::text_only(reply)],
    )
    .with_loop_delay(Duration::from_millis(120));
    let store = Arc::new(InMemoryStore::new());
    let (orchestrator, _) = orchestrator_with(Arc::new(provider), store);

    let mut stream = stream_turn(orchestrator, request(), 16, Duration::from_millis(25));

    let mut keepalives = 0;
    let mut collected = String::new();
    let mut finals = 0;
    let mut last_was_final = false;
    while let Some(event) = stream.next().await {
        match event {
            TransportEvent::Keepalive => {
                assert!(collected.is_empty(), "keepalives only while waiting");
                keepalives += 1;
                last_was_final = false;
            }
            TransportEvent::Chunk(text) => {
                assert_eq!(finals, 0, "chunk after terminal event");
                assert!(text.chars().count() <= 16);
                collected.push_str(&text);
                last_was_final = false;
            }
            TransportEvent::Final(result) => {
                finals += 1;
                last_was_final = true;
                assert_eq!(result.reply, reply);
            }
        }
    }
    assert!(keepalives >= 1, "slow model call should trigger a keepalive");
    assert_eq!(collected, reply);
    assert_eq!(finals, 1);
    assert!(last_was_final);
}

#[tokio::test]
async fn fast_turn_skips_keepalives() {
    let provider = MockProvider::new(
        vec![ALLOW_VERDICT, PASS_VERDICT],
        vec![ProviderResponse::text_only("quick answer")],
    );
    let store = Arc::new(InMemoryStore::new());
    let (orchestrator, _) = orchestrator_with(Arc::new(provider), store);

    let mut stream = stream_turn(orchestrator, request(), 120, Duration::from_secs(60));

    let events: Vec<TransportEvent> = {
        let mut out = Vec::new();
        while let Some(event) = stream.next().await {
            out.push(event);
        }
        out
    };
    assert!(events
        .iter()
        .all(|e| !matches!(e, TransportEvent::Keepalive)));
    assert!(matches!(events.last(), Some(TransportEvent::Final(_))));
}

#[tokio::test]
async fn sse_frames_are_well_formed_on_the_wire() {
    let provider = MockProvider::new(
        vec![ALLOW_VERDICT, PASS_VERDICT],
        vec![ProviderResponse::text_only("wire check")],
    );
    let store = Arc::new(InMemoryStore::new());
    let (orchestrator, _) = orchestrator_with(Arc::new(provider), store);

    let mut stream = stream_turn(orchestrator, request(), 120, Duration::from_secs(60));
    while let Some(event) = stream.next().await {
        let frame = event.to_sse();
        assert!(frame.ends_with("\n\n"));
        if let Some(json_line) = frame.strip_prefix("data: ") {
            let value: serde_json::Value =
                serde_json::from_str(json_line.trim_end()).unwrap();
            assert!(value.is_object());
        } else {
            assert_eq!(frame, ": ping\n\n");
        }
    }
}

#[tokio::test]
async fn dropped_consumer_lets_the_turn_finish_quietly() {
    let provider = MockProvider::new(
        vec![ALLOW_VERDICT, PASS_VERDICT],
        vec![ProviderResponse::text_only("never delivered")],
    )
    .with_loop_delay(Duration::from_millis(80));
    let store = Arc::new(InMemoryStore::new());
    let (orchestrator, _) = orchestrator_with(Arc::new(provider), store);

    let stream = stream_turn(orchestrator, request(), 120, Duration::from_millis(10));
    drop(stream);
    // The detached task awaits the in-flight turn and discards its output.
    tokio::time::sleep(Duration::from_millis(150)).await;
}
