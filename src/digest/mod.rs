//! Daily digest generation.
//!
//! A digest is an ordinary conversation turn with a fixed prompt and empty
//! history, followed by one parsing pass over the result. No extra model
//! calls happen here.

pub mod markdown;

use crate::agent::{
    ConversationRequest, ConversationResult, GuardrailReport, Intent, Orchestrator, Proposals,
    Scope,
};
use crate::retrieval::{Reference, RetrievalGateway};
use crate::store::{MeetingSummary, RiskSummary, TaskSummary};
use chrono::NaiveDate;
use markdown::{extract_tail, section_bullets, tail_string_list};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const OVERVIEW_HEADING: &str = "Today's Overview";
const PRIORITIES_HEADING: &str = "Top Priorities (Next Steps)";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DigestSections {
    pub overview: Vec<String>,
    pub priorities: Vec<String>,
    pub meetings: Vec<MeetingSummary>,
    pub tasks: Vec<TaskSummary>,
    pub risks: Vec<RiskSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestPayload {
    pub date: NaiveDate,
    pub markdown: String,
    pub intent: Intent,
    pub sections: DigestSections,
    /// Proposals the turn accumulated, surfaced as suggested actions.
    pub actions: Proposals,
    pub references: Vec<Reference>,
    pub followups: Vec<String>,
    pub guardrails: GuardrailReport,
}

pub struct DigestGenerator {
    orchestrator: Arc<Orchestrator>,
    retrieval: Arc<RetrievalGateway>,
}

impl DigestGenerator {
    pub fn new(orchestrator: Arc<Orchestrator>, retrieval: Arc<RetrievalGateway>) -> Self {
        Self {
            orchestrator,
            retrieval,
        }
    }

    pub async fn generate(&self, scope: &Scope, date: NaiveDate) -> DigestPayload {
        let request = ConversationRequest {
            scope: scope.clone(),
            message: format!(
                "Generate my digest for {date}: meetings, risks, 3-7 priorities, tasks."
            ),
            history: Vec::new(),
            date: Some(date),
        };
        let result = self.orchestrator.run(&request, None).await;
        self.assemble(scope, date, result).await
    }

    /// Pure merge of the conversation result into the digest shape, plus a
    /// fresh fact retrieval only when the turn captured none.
    async fn assemble(
        &self,
        scope: &Scope,
        date: NaiveDate,
        result: ConversationResult,
    ) -> DigestPayload {
        let tail = extract_tail(&result.reply);
        let overview = section_bullets(&result.reply, OVERVIEW_HEADING);
        let priorities = section_bullets(&result.reply, PRIORITIES_HEADING);
        let followups = tail_string_list(tail.as_ref(), "followups");

        let mut bundle = result.bundle;
        if bundle.tasks.is_empty() && bundle.meetings.is_empty() && bundle.risks.is_empty() {
            let fresh = self.retrieval.retrieve(scope, "", date, None).await;
            bundle.tasks = fresh.tasks;
            bundle.meetings = fresh.meetings;
            bundle.risks = fresh.risks;
        }

        DigestPayload {
            date,
            markdown: result.reply,
            intent: result.intent,
            sections: DigestSections {
                overview,
                priorities,
                meetings: bundle.meetings,
                tasks: bundle.tasks,
                risks: bundle.risks,
            },
            actions: result.proposals,
            references: result.references,
            followups,
            guardrails: result.guardrails,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{TaskStatus, ToolRegistry};
    use crate::config::{AgentConfig, LlmConfig};
    use crate::embedding::NoopEmbedding;
    use crate::llm::{Provider, ProviderMessage, ProviderResponse};
    use crate::store::InMemoryStore;
    use std::collections::VecDeque;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;

    struct MockProvider {
        guardrail_replies: Mutex<VecDeque<String>>,
        loop_responses: Mutex<VecDeque<ProviderResponse>>,
    }

    impl Provider for MockProvider {
        fn name(&self) -> &str {
            "mock"
        }

        fn chat_with_system<'a>(
            &'a self,
            _system_prompt: Option<&'a str>,
            _message: &'a str,
            _model: &'a str,
            _temperature: f64,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>> {
            Box::pin(async move {
                self.guardrail_replies
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .pop_front()
                    .ok_or_else(|| anyhow::anyhow!("guardrail script exhausted"))
            })
        }

        fn chat_with_tools<'a>(
            &'a self,
            _system_prompt: Option<&'a str>,
            _messages: &'a [ProviderMessage],
            _tools: &'a [crate::agent::ToolSpec],
            _model: &'a str,
            _temperature: f64,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<ProviderResponse>> + Send + 'a>>
        {
            Box::pin(async move {
                self.loop_responses
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .pop_front()
                    .ok_or_else(|| anyhow::anyhow!("loop script exhausted"))
            })
        }
    }

    fn generator(reply: &str, store: Arc<InMemoryStore>) -> DigestGenerator {
        let provider = Arc::new(MockProvider {
            guardrail_replies: Mutex::new(
                vec![
                    r#"{"tripwire": false, "intent": "daily_digest"}"#.to_string(),
                    r#"{"tripwire": false}"#.to_string(),
                ]
                .into(),
            ),
            loop_responses: Mutex::new(
                vec![ProviderResponse::text_only(reply)].into(),
            ),
        });
        let retrieval = Arc::new(RetrievalGateway::new(Arc::new(NoopEmbedding), store));
        let orchestrator = Arc::new(Orchestrator::new(
            provider,
            retrieval.clone(),
            Arc::new(ToolRegistry::standard()),
            &LlmConfig::default(),
            &AgentConfig::default(),
        ));
        DigestGenerator::new(orchestrator, retrieval)
    }

    #[tokio::test]
    async fn digest_parses_sections_and_tail() {
        let reply = "\
## Today's Overview\n\
- quiet morning\n\
## Top Priorities (Next Steps)\n\
- close the Q2 review\n\
```json\n{\"intent\":\"daily_digest\",\"followups\":[\"confirm agenda\"]}\n```";
        let store = Arc::new(InMemoryStore::new());
        let generator = generator(reply, store);
        let scope = Scope::global("u1");
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();

        let digest = generator.generate(&scope, date).await;
        assert_eq!(digest.intent, Intent::DailyDigest);
        assert_eq!(digest.sections.overview, vec!["quiet morning"]);
        assert_eq!(digest.sections.priorities, vec!["close the Q2 review"]);
        assert_eq!(digest.followups, vec!["confirm agenda"]);
        assert_eq!(digest.date, date);
    }

    #[tokio::test]
    async fn missing_tail_defaults_followups_empty() {
        let store = Arc::new(InMemoryStore::new());
        let generator = generator("## Today's Overview\n- only prose\n", store);
        let scope = Scope::global("u1");
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();

        let digest = generator.generate(&scope, date).await;
        assert!(digest.followups.is_empty());
        assert!(digest.sections.priorities.is_empty());
    }

    #[tokio::test]
    async fn facts_fall_back_to_fresh_retrieval() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_task(
            TaskSummary {
                id: "t1".into(),
                project_id: None,
                title: "only in store".into(),
                status: TaskStatus::Todo,
                due_date: None,
                updated_at: chrono::Utc::now(),
            },
            "u1",
        );

        // Scripted turn performs its own initial retrieval, which already
        // captures the task; either path must surface it.
        let generator = generator("## Today's Overview\n- x\n", store);
        let scope = Scope::global("u1");
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();

        let digest = generator.generate(&scope, date).await;
        assert_eq!(digest.sections.tasks.len(), 1);
        assert_eq!(digest.sections.tasks[0].id, "t1");
    }
}
