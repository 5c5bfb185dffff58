//! Output guardrail — checks the draft reply against the evidence it cites.
//!
//! Same fail-open posture as the input side: infrastructure trouble passes
//! the draft through untouched, and only an explicit classifier veto blocks.
//! Minor shape problems (missing headings, missing tail) come back patched.

use super::parse::{bool_field, parse_decision_json, str_field};
use crate::agent::{Intent, Proposals};
use crate::llm::Provider;
use crate::retrieval::RetrievalBundle;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputDecision {
    pub tripwire: bool,
    /// Human-facing verdict. May be empty even when tripwired; the
    /// orchestrator then falls back to the input verdict or a generic
    /// refusal.
    pub message: String,
    /// The reply to deliver: the draft, possibly repaired by the classifier.
    pub patched: String,
}

impl OutputDecision {
    fn pass_through(draft: &str) -> Self {
        Self {
            tripwire: false,
            message: String::new(),
            patched: draft.to_string(),
        }
    }
}

pub struct OutputGuardrail {
    provider: Arc<dyn Provider>,
    model: String,
}

impl OutputGuardrail {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    pub async fn validate(
        &self,
        draft: &str,
        evidence: &RetrievalBundle,
        proposals: &Proposals,
        intent: Intent,
    ) -> OutputDecision {
        if !self.provider.is_enabled() {
            return OutputDecision::pass_through(draft);
        }

        let system = validator_system_prompt();
        let user = validator_user_prompt(draft, evidence, proposals, intent);
        match self
            .provider
            .chat_with_system(Some(&system), &user, &self.model, 0.0)
            .await
        {
            Ok(raw) => Self::parse_verdict(&raw, draft),
            Err(error) => {
                tracing::warn!(%error, "output guardrail call failed; passing draft through");
                OutputDecision::pass_through(draft)
            }
        }
    }

    fn parse_verdict(raw: &str, draft: &str) -> OutputDecision {
        let Some(value) = parse_decision_json(raw) else {
            tracing::warn!("output guardrail returned unparseable verdict; passing draft through");
            return OutputDecision::pass_through(draft);
        };

        let tripwire = bool_field(&value, "tripwire");
        // `patched` is canonical; `patched_reply` accepted as an alias.
        let patched = str_field(&value, "patched")
            .or_else(|| str_field(&value, "patched_reply"))
            .map_or_else(|| draft.to_string(), str::to_string);
        let message = str_field(&value, "message")
            .map_or_else(String::new, str::to_string);

        OutputDecision {
            tripwire,
            message,
            patched,
        }
    }
}

fn validator_system_prompt() -> String {
    "You review a drafted assistant reply before delivery.\n\
     Checks, in order:\n\
     1. Required markdown sections exist (\"Summary\", \"Recommendations\" or\n\
        \"Next Steps\", \"Quick actions\"). Add missing sections if a minor\n\
        repair suffices.\n\
     2. Every factual claim is supported by the provided evidence. Veto\n\
        (tripwire) if claims are unsupported.\n\
     3. A fenced JSON tail with intent/references/proposed_tasks/followups is\n\
        present and lists exactly the proposals provided. Never invent\n\
        proposals.\n\
     Respond with strict JSON only:\n\
     {\"tripwire\": bool, \"message\": string, \"patched\": string}\n\
     `patched` is the full reply to deliver (the draft, repaired if needed)."
        .to_string()
}

fn validator_user_prompt(
    draft: &str,
    evidence: &RetrievalBundle,
    proposals: &Proposals,
    intent: Intent,
) -> String {
    let evidence_json =
        serde_json::to_string_pretty(evidence).unwrap_or_else(|_| "{}".to_string());
    let proposals_json =
        serde_json::to_string_pretty(proposals).unwrap_or_else(|_| "{}".to_string());
    format!(
        "Intent: {intent}\n\nEvidence bundle:\n{evidence_json}\n\n\
         Accumulated proposals:\n{proposals_json}\n\nDraft reply:\n{draft}"
    )
}
