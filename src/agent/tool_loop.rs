//! Tool-mediated agent loop.
//!
//! Drives a tool-use conversation with the provider: send the transcript,
//! execute whatever tool calls come back, append the results, repeat until
//! the model answers in plain text or the call budget runs out. Tool calls
//! within one response are executed sequentially, in order, all appending to
//! the same turn context.

use super::context::ExecutionContext;
use super::registry::ToolRegistry;
use super::tools::{ToolResult, ToolSpec};
use crate::llm::{
    ContentBlock, MessageRole, Provider, ProviderMessage, ProviderResponse, StreamCollector,
    StreamSink,
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Absolute upper bound on tool calls per turn, regardless of configuration.
pub(crate) const TOOL_CALL_HARD_CAP: usize = 6;

/// Only this many trailing history turns are sent to the model.
const MAX_HISTORY_TURNS: usize = 9;

pub struct ToolLoop {
    registry: Arc<ToolRegistry>,
    max_tool_calls: usize,
}

pub struct ToolLoopRunParams<'a> {
    pub provider: &'a dyn Provider,
    pub system_prompt: &'a str,
    pub user_message: &'a str,
    pub model: &'a str,
    pub temperature: f64,
    pub ctx: &'a ExecutionContext,
    pub stream_sink: Option<Arc<dyn StreamSink>>,
    pub conversation_history: &'a [ProviderMessage],
}

/// Record of a single tool invocation within the loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub args: serde_json::Value,
    pub result: ToolResult,
}

/// Why the tool loop terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStopReason {
    /// The model finished without requesting more tool calls.
    Completed,
    /// The tool-call budget was exhausted.
    ToolLimit,
}

pub struct ToolLoopResult {
    pub final_text: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub tokens_used: Option<u64>,
    pub stop_reason: LoopStopReason,
}

struct LoopState {
    tool_calls: Vec<ToolCallRecord>,
    total_tokens: u64,
    has_token_info: bool,
}

impl LoopState {
    fn tokens_used(&self) -> Option<u64> {
        if self.has_token_info {
            Some(self.total_tokens)
        } else {
            None
        }
    }
}

impl ToolLoop {
    pub fn new(registry: Arc<ToolRegistry>, max_tool_calls: usize) -> Self {
        Self {
            registry,
            max_tool_calls: max_tool_calls.clamp(1, TOOL_CALL_HARD_CAP),
        }
    }

    /// Run the loop to completion, returning the model's final text.
    pub async fn run(&self, params: ToolLoopRunParams<'_>) -> anyhow::Result<ToolLoopResult> {
        let tools = self.registry.specs_for_scope(&params.ctx.scope);
        let mut messages = build_initial_messages(params.conversation_history, params.user_message);
        let mut state = LoopState {
            tool_calls: Vec::new(),
            total_tokens: 0,
            has_token_info: false,
        };

        loop {
            let budget_left = state.tool_calls.len() < self.max_tool_calls;
            // Once the budget is spent, withhold the toolbox so the model
            // must answer in text instead of queueing calls we would refuse.
            let offered: &[ToolSpec] = if budget_left { &tools } else { &[] };

            let response = self
                .chat_once(params.provider, &messages, offered, &params)
                .await?;

            if let Some(tokens) = response.total_tokens() {
                state.total_tokens += tokens;
                state.has_token_info = true;
            }
            messages.push(response.to_assistant_message());

            if response.has_tool_use() && budget_left {
                self.execute_tool_blocks(&response, &mut messages, &mut state, params.ctx)
                    .await;
                continue;
            }

            let final_text = extract_last_text(&messages);
            let stop_reason = if response.has_tool_use() {
                // Budget exhausted while the model still wanted tools.
                LoopStopReason::ToolLimit
            } else {
                LoopStopReason::Completed
            };
            return Ok(ToolLoopResult {
                final_text,
                tokens_used: state.tokens_used(),
                tool_calls: state.tool_calls,
                stop_reason,
            });
        }
    }

    async fn execute_tool_blocks(
        &self,
        response: &ProviderResponse,
        messages: &mut Vec<ProviderMessage>,
        state: &mut LoopState,
        ctx: &ExecutionContext,
    ) {
        for block in response.tool_use_blocks() {
            let ContentBlock::ToolUse { id, name, input } = block else {
                continue;
            };

            let result = if state.tool_calls.len() >= self.max_tool_calls {
                ToolResult::fail("tool-call budget for this turn is exhausted")
            } else {
                match self.registry.execute(name, input.clone(), ctx).await {
                    Ok(result) => result,
                    Err(error) => ToolResult::fail(error.to_string()),
                }
            };

            state.tool_calls.push(ToolCallRecord {
                tool_name: name.clone(),
                args: input.clone(),
                result: result.clone(),
            });
            ctx.scratch().tool_calls = state.tool_calls.len();

            let content = format_tool_result_content(&result);
            messages.push(ProviderMessage::tool_result(id, content, !result.success));
        }
    }

    async fn chat_once(
        &self,
        provider: &dyn Provider,
        messages: &[ProviderMessage],
        tools: &[ToolSpec],
        params: &ToolLoopRunParams<'_>,
    ) -> anyhow::Result<ProviderResponse> {
        let system = Some(params.system_prompt);

        if let Some(sink) = &params.stream_sink {
            let mut stream = provider
                .chat_with_tools_stream(system, messages, tools, params.model, params.temperature)
                .await?;

            let mut collector = StreamCollector::new();
            while let Some(event_result) = stream.next().await {
                let event = event_result?;
                sink.on_event(&event).await;
                collector.feed(&event);
            }
            Ok(collector.finish())
        } else {
            provider
                .chat_with_tools(system, messages, tools, params.model, params.temperature)
                .await
        }
    }
}

fn build_initial_messages(
    history: &[ProviderMessage],
    user_message: &str,
) -> Vec<ProviderMessage> {
    let start = history.len().saturating_sub(MAX_HISTORY_TURNS);
    let mut messages: Vec<ProviderMessage> = history[start..].to_vec();
    messages.push(ProviderMessage::user(user_message));
    messages
}

fn extract_last_text(messages: &[ProviderMessage]) -> String {
    messages
        .iter()
        .rev()
        .find(|msg| msg.role == MessageRole::Assistant)
        .map(|msg| {
            msg.content
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    ContentBlock::ToolUse { .. } | ContentBlock::ToolResult { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

fn format_tool_result_content(result: &ToolResult) -> String {
    if result.success {
        result.output.clone()
    } else {
        format!(
            "Error: {}",
            result.error.as_deref().unwrap_or("unknown error")
        )
    }
}
