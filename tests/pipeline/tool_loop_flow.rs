use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::mock_provider::{tool_use, MockProvider, PASS_VERDICT};
use crate::orchestrator_with;
use serde_json::json;
use steward::agent::{
    ConversationRequest, Orchestrator, Scope, ToolRegistry,
};
use steward::config::{AgentConfig, LlmConfig};
use steward::embedding::{EmbeddingProvider, EMBEDDING_DIMENSIONS};
use steward::llm::{Provider, ProviderResponse};
use steward::retrieval::RetrievalGateway;
use steward::store::memory::StoredItem;
use steward::store::{InMemoryStore, ItemKind};

/// Constant-vector embedder: every query lands at distance 0 from every
/// seeded item, so retrieval surfaces all of them.
struct ConstantEmbedding;

impl EmbeddingProvider for ConstantEmbedding {
    fn name(&self) -> &str {
        "constant"
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }

    fn embed<'a>(
        &'a self,
        texts: &'a [&'a str],
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<Vec<f32>>>> + Send + 'a>> {
        Box::pin(async move {
            Ok(texts
                .iter()
                .map(|_| vec![1.0_f32; EMBEDDING_DIMENSIONS])
                .collect())
        })
    }
}

fn seeded_store() -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    for id in ["item_a", "item_b"] {
        store.insert_item(StoredItem {
            item_id: id.into(),
            project_id: None,
            owner_id: "u1".into(),
            kind: ItemKind::Note,
            title: Some(format!("note {id}")),
            body_markdown: Some(format!("body of {id}")),
            body_text: None,
            lines: Vec::new(),
            raw: None,
            embedding: vec![1.0; EMBEDDING_DIMENSIONS],
        });
    }
    store
}

fn semantic_orchestrator(provider: Arc<dyn Provider>) -> Arc<Orchestrator> {
    let retrieval = Arc::new(RetrievalGateway::new(
        Arc::new(ConstantEmbedding),
        seeded_store(),
    ));
    Arc::new(Orchestrator::new(
        provider,
        retrieval,
        Arc::new(ToolRegistry::standard()),
        &LlmConfig::default(),
        &AgentConfig::default(),
    ))
}

fn request(message: &str) -> ConversationRequest {
    ConversationRequest {
        scope: Scope::global("u1"),
        message: message.to_string(),
        history: Vec::new(),
        date: chrono::NaiveDate::from_ymd_opt(2026, 3, 2),
    }
}

#[tokio::test]
async fn repeated_retrieval_deduplicates_references_first_seen() {
    let provider = MockProvider::new(
        vec![r#"{"tripwire": false, "intent": "status"}"#, PASS_VERDICT],
        vec![
            tool_use("c1", "fetch_context", json!({"query": "roadmap"})),
            tool_use("c2", "fetch_context", json!({"query": "roadmap again"})),
            ProviderResponse::text_only("## Summary\ndone"),
        ],
    );
    let orchestrator = semantic_orchestrator(Arc::new(provider));

    // Initial retrieval plus two tool retrievals all hit the same items.
    let result = orchestrator.run(&request("roadmap status"), None).await;
    let mut ids: Vec<&str> = result
        .references
        .iter()
        .map(|r| r.item_id.as_str())
        .collect();
    assert_eq!(ids.len(), 2, "each item referenced at most once");
    ids.sort_unstable();
    assert_eq!(ids, vec!["item_a", "item_b"]);
}

#[tokio::test]
async fn tool_budget_bounds_runaway_calls() {
    let mut responses: Vec<ProviderResponse> = (0..7)
        .map(|i| {
            tool_use(
                &format!("c{i}"),
                "create_task",
                json!({"title": format!("task {i}")}),
            )
        })
        .collect();
    responses.push(ProviderResponse::text_only("## Summary\nfinally"));

    let provider = MockProvider::new(
        vec![r#"{"tripwire": false, "intent": "task_query"}"#, PASS_VERDICT],
        responses,
    );
    let store = Arc::new(InMemoryStore::new());
    let (orchestrator, _) = orchestrator_with(Arc::new(provider), store);

    let result = orchestrator.run(&request("make lots of tasks"), None).await;
    // Six calls executed, the seventh request hit the withdrawn toolbox.
    assert_eq!(result.proposals.tasks.len(), 6);
    assert!(!result.reply.is_empty());
}

#[tokio::test]
async fn set_reminder_refused_outside_global_scope() {
    let provider = MockProvider::new(
        vec![r#"{"tripwire": false, "intent": "general_q"}"#, PASS_VERDICT],
        vec![
            tool_use(
                "c1",
                "set_reminder",
                json!({"content": "ping legal", "dueAt": "2026-03-05T09:00:00Z"}),
            ),
            ProviderResponse::text_only("## Summary\nunderstood"),
        ],
    );
    let store = Arc::new(InMemoryStore::new());
    let (orchestrator, _) = orchestrator_with(Arc::new(provider), store);

    let request = ConversationRequest {
        scope: Scope::project("p1", "apollo"),
        message: "remind me later".into(),
        history: Vec::new(),
        date: chrono::NaiveDate::from_ymd_opt(2026, 3, 2),
    };
    let result = orchestrator.run(&request, None).await;
    assert!(result.proposals.reminders.is_empty());
    assert_eq!(result.reply, "## Summary\nunderstood");
}

#[tokio::test]
async fn mixed_tool_calls_preserve_proposal_order() {
    let provider = MockProvider::new(
        vec![r#"{"tripwire": false, "intent": "plan"}"#, PASS_VERDICT],
        vec![
            tool_use("c1", "create_task", json!({"title": "first"})),
            tool_use("c2", "add_note", json!({"body": "captured"})),
            tool_use("c3", "create_task", json!({"title": "second"})),
            ProviderResponse::text_only("## Summary\nproposed things"),
        ],
    );
    let store = Arc::new(InMemoryStore::new());
    let (orchestrator, _) = orchestrator_with(Arc::new(provider), store);

    let result = orchestrator.run(&request("plan it"), None).await;
    let titles: Vec<&str> = result
        .proposals
        .tasks
        .iter()
        .map(|t| t.title.as_str())
        .collect();
    assert_eq!(titles, vec!["first", "second"]);
    assert_eq!(result.proposals.notes.len(), 1);
}
