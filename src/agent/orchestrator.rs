//! The conversation orchestrator — one turn, end to end.
//!
//! Pipeline per turn: input guardrail, initial retrieval, tool-mediated
//! agent loop, output guardrail. Every stage degrades to a documented
//! fallback; the caller always receives a well-formed result, never an
//! error.

use super::context::ExecutionContext;
use super::prompt::system_prompt;
use super::proposals::Proposals;
use super::registry::ToolRegistry;
use super::scope::{Intent, Scope};
use super::tool_loop::{ToolLoop, ToolLoopRunParams};
use crate::config::{AgentConfig, LlmConfig};
use crate::guardrails::{InputGuardrail, OutputGuardrail};
use crate::llm::{Provider, ProviderMessage, StreamSink};
use crate::retrieval::{Reference, RetrievalBundle, RetrievalGateway};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const DISABLED_REPLY: &str =
    "The language model is not configured, so I can't compose a reply right now. \
     Set an API key to enable conversations.";
const GENERIC_FALLBACK: &str =
    "I couldn't complete that request. Please try again.";
const GENERIC_VETO_REPLY: &str =
    "I can't share that reply; it didn't pass review.";

#[derive(Debug, Clone)]
pub struct ConversationRequest {
    pub scope: Scope,
    pub message: String,
    pub history: Vec<ProviderMessage>,
    /// Date anchor for calendar-bound retrieval; defaults to today (UTC).
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardrailReport {
    pub input_tripwire: bool,
    pub input_message: String,
    pub output_tripwire: bool,
    pub output_message: String,
}

/// What the caller gets back, tripwired or not. Always well-formed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationResult {
    pub reply: String,
    pub intent: Intent,
    pub references: Vec<Reference>,
    pub proposals: Proposals,
    /// The evidence bundle accumulated across the turn's retrievals.
    pub bundle: RetrievalBundle,
    pub guardrails: GuardrailReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
}

pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    retrieval: Arc<RetrievalGateway>,
    registry: Arc<ToolRegistry>,
    input_guardrail: InputGuardrail,
    output_guardrail: OutputGuardrail,
    model: String,
    temperature: f64,
    max_tool_calls: usize,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn Provider>,
        retrieval: Arc<RetrievalGateway>,
        registry: Arc<ToolRegistry>,
        llm: &LlmConfig,
        agent: &AgentConfig,
    ) -> Self {
        Self {
            input_guardrail: InputGuardrail::new(provider.clone(), &llm.guardrail_model),
            output_guardrail: OutputGuardrail::new(provider.clone(), &llm.guardrail_model),
            provider,
            retrieval,
            registry,
            model: llm.model.clone(),
            temperature: llm.temperature,
            max_tool_calls: agent.max_tool_calls as usize,
        }
    }

    /// Run one conversation turn. If `stream_sink` is set, model text deltas
    /// are forwarded to it as they arrive.
    pub async fn run(
        &self,
        request: &ConversationRequest,
        stream_sink: Option<Arc<dyn StreamSink>>,
    ) -> ConversationResult {
        let date = request.date.unwrap_or_else(|| Utc::now().date_naive());

        let input = self
            .input_guardrail
            .evaluate(&request.scope, &request.message, &request.history)
            .await;
        let mut guardrails = GuardrailReport {
            input_tripwire: input.tripwire,
            input_message: input.message.clone(),
            ..Default::default()
        };

        if input.tripwire {
            tracing::info!(intent = %input.intent, "input guardrail tripwired");
            return ConversationResult {
                reply: input.message,
                intent: input.intent,
                references: Vec::new(),
                proposals: Proposals::default(),
                bundle: RetrievalBundle::default(),
                guardrails,
                tokens_used: None,
            };
        }

        if !self.provider.is_enabled() {
            return ConversationResult {
                reply: DISABLED_REPLY.to_string(),
                intent: input.intent,
                references: Vec::new(),
                proposals: Proposals::default(),
                bundle: RetrievalBundle::default(),
                guardrails,
                tokens_used: None,
            };
        }

        let ctx = ExecutionContext::new(
            request.scope.clone(),
            input.intent,
            date,
            self.retrieval.clone(),
        );
        let initial_bundle = ctx
            .retrieve_into_scratch(&input.rewritten, None, None)
            .await;
        let system = system_prompt(&request.scope, input.intent, date, &initial_bundle);

        let loop_ = ToolLoop::new(self.registry.clone(), self.max_tool_calls);
        let loop_result = loop_
            .run(ToolLoopRunParams {
                provider: self.provider.as_ref(),
                system_prompt: &system,
                user_message: &input.rewritten,
                model: &self.model,
                temperature: self.temperature,
                ctx: &ctx,
                stream_sink,
                conversation_history: &request.history,
            })
            .await;

        let scratch = ctx.into_scratch();
        let mut tokens_used = None;
        let draft = match loop_result {
            Ok(result) => {
                tokens_used = result.tokens_used;
                if result.final_text.trim().is_empty() {
                    tracing::warn!(stop = ?result.stop_reason, "loop ended without text");
                    GENERIC_FALLBACK.to_string()
                } else {
                    result.final_text
                }
            }
            Err(error) => {
                tracing::error!(%error, "agent loop failed");
                GENERIC_FALLBACK.to_string()
            }
        };

        let output = self
            .output_guardrail
            .validate(&draft, &scratch.bundle, &scratch.proposals, input.intent)
            .await;
        guardrails.output_tripwire = output.tripwire;
        guardrails.output_message = output.message.clone();

        let reply = if output.tripwire {
            tracing::info!("output guardrail tripwired");
            // Priority: output verdict message, then input verdict message,
            // then a generic refusal. "OK" is the allow default, not a
            // usable reply.
            pick_nonempty(&output.message)
                .or_else(|| pick_nonempty(&input.message).filter(|m| *m != "OK"))
                .unwrap_or(GENERIC_VETO_REPLY)
                .to_string()
        } else {
            output.patched
        };

        // A late veto still surfaces accumulated partial progress.
        ConversationResult {
            reply,
            intent: input.intent,
            references: scratch.bundle.references.clone(),
            proposals: scratch.proposals,
            bundle: scratch.bundle,
            guardrails,
            tokens_used,
        }
    }
}

fn pick_nonempty(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
