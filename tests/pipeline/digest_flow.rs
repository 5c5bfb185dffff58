use std::sync::Arc;

use crate::mock_provider::{MockProvider, PASS_VERDICT};
use crate::orchestrator_with;
use chrono::{NaiveDate, TimeZone, Utc};
use steward::agent::{Intent, Scope, TaskStatus};
use steward::digest::DigestGenerator;
use steward::llm::ProviderResponse;
use steward::store::{InMemoryStore, MeetingSummary, RiskSummary, Store, TaskSummary};

const DIGEST_VERDICT: &str = r#"{"tripwire": false, "intent": "daily_digest"}"#;

const DIGEST_REPLY: &str = "\
## Today's Overview\n\
- two meetings, one project trending risky\n\
- inbox is quiet\n\
\n\
## Top Priorities (Next Steps)\n\
- unblock the data migration\n\
- confirm the board deck owner\n\
- review apollo's risk spike\n\
\n\
```json\n\
{\"intent\": \"daily_digest\", \"references\": [], \"proposed_tasks\": [], \"followups\": [\"check migration status at 4pm\"]}\n\
```";

fn seeded_store() -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    store.insert_task(
        TaskSummary {
            id: "t1".into(),
            project_id: Some("p1".into()),
            title: "unblock the data migration".into(),
            status: TaskStatus::InProgress,
            due_date: None,
            updated_at: Utc.with_ymd_and_hms(2026, 3, 1, 18, 0, 0).unwrap(),
        },
        "u1",
    );
    store.insert_meeting(
        MeetingSummary {
            id: "m1".into(),
            project_id: Some("p1".into()),
            title: "apollo standup".into(),
            starts_at: Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
            location: Some("room 4".into()),
        },
        "u1",
    );
    store.insert_risk(
        RiskSummary {
            project_id: "p1".into(),
            score: 0.7,
            level: "high".into(),
            computed_at: Utc.with_ymd_and_hms(2026, 3, 2, 6, 0, 0).unwrap(),
        },
        "u1",
    );
    store
}

fn digest_generator(reply: &str, store: Arc<InMemoryStore>) -> DigestGenerator {
    let provider = MockProvider::new(
        vec![DIGEST_VERDICT, PASS_VERDICT],
        vec![ProviderResponse::text_only(reply)],
    );
    let (orchestrator, retrieval) = orchestrator_with(Arc::new(provider), store);
    DigestGenerator::new(orchestrator, retrieval)
}

#[tokio::test]
async fn digest_combines_markdown_sections_with_store_facts() {
    let store = seeded_store();
    let generator = digest_generator(DIGEST_REPLY, store);
    let scope = Scope::global("u1");
    let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();

    let digest = generator.generate(&scope, date).await;
    assert_eq!(digest.intent, Intent::DailyDigest);
    assert_eq!(digest.sections.overview.len(), 2);
    assert_eq!(digest.sections.priorities.len(), 3);
    assert_eq!(
        digest.sections.priorities[0],
        "unblock the data migration"
    );
    assert_eq!(digest.followups, vec!["check migration status at 4pm"]);

    // Authoritative facts come straight from the store.
    assert_eq!(digest.sections.tasks.len(), 1);
    assert_eq!(digest.sections.meetings.len(), 1);
    assert_eq!(digest.sections.meetings[0].title, "apollo standup");
    assert_eq!(digest.sections.risks.len(), 1);
    assert_eq!(digest.sections.risks[0].level, "high");
    assert_eq!(digest.markdown, DIGEST_REPLY);
}

#[tokio::test]
async fn digest_without_expected_headings_degrades_to_empty_lists() {
    let store = Arc::new(InMemoryStore::new());
    let generator = digest_generator("A freeform answer with no structure.", store);
    let scope = Scope::global("u1");
    let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();

    let digest = generator.generate(&scope, date).await;
    assert!(digest.sections.overview.is_empty());
    assert!(digest.sections.priorities.is_empty());
    assert!(digest.followups.is_empty());
    assert_eq!(digest.markdown, "A freeform answer with no structure.");
}

#[tokio::test]
async fn digest_persists_only_on_request() {
    let store = seeded_store();
    let generator = digest_generator(DIGEST_REPLY, store.clone());
    let scope = Scope::global("u1");
    let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();

    let digest = generator.generate(&scope, date).await;
    assert_eq!(store.saved_digests(), 0, "generation alone never writes");

    let payload = serde_json::to_value(&digest).unwrap();
    store.save_digest(&scope, date, &payload).await.unwrap();
    assert_eq!(store.saved_digests(), 1);
}
