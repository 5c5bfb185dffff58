//! Incremental provider output: events, sinks, and reassembly.
//!
//! A streaming chat call yields `StreamEvent`s. Sinks observe them as they
//! arrive (the CLI prints text deltas live); `StreamCollector` reassembles
//! the full `ProviderResponse` so the tool loop sees the same shape whether
//! or not the call streamed.

use super::types::{ContentBlock, ProviderResponse, StopReason};
use anyhow::Result;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type ProviderStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send + 'static>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StreamEvent {
    Started {
        model: Option<String>,
    },
    Text {
        delta: String,
    },
    /// One piece of a tool call. `slot` identifies which concurrent call the
    /// fragment belongs to; `args_fragment` concatenates into its JSON input.
    ToolCallFragment {
        slot: u32,
        id: Option<String>,
        name: Option<String>,
        args_fragment: String,
    },
    /// A tool call delivered whole, no fragment assembly needed.
    ToolCall {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    Finished {
        stop_reason: Option<StopReason>,
        input_tokens: Option<u64>,
        output_tokens: Option<u64>,
    },
}

pub trait StreamSink: Send + Sync {
    fn on_event<'a>(
        &'a self,
        event: &'a StreamEvent,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

#[derive(Debug, Default)]
pub struct NullStreamSink;

impl StreamSink for NullStreamSink {
    fn on_event<'a>(
        &'a self,
        _event: &'a StreamEvent,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async {})
    }
}

/// Prints text deltas to stderr as they arrive; used by `steward chat`.
pub struct CliStreamSink {
    writer: Arc<dyn Fn(&str) + Send + Sync>,
}

impl CliStreamSink {
    pub fn new() -> Self {
        Self {
            writer: Arc::new(|text| {
                eprint!("{text}");
            }),
        }
    }

    #[cfg(test)]
    fn with_writer(writer: Arc<dyn Fn(&str) + Send + Sync>) -> Self {
        Self { writer }
    }
}

impl Default for CliStreamSink {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamSink for CliStreamSink {
    fn on_event<'a>(
        &'a self,
        event: &'a StreamEvent,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            if let StreamEvent::Text { delta } = event {
                (self.writer)(delta);
            }
        })
    }
}

/// Folds a stream of events back into one `ProviderResponse`.
#[derive(Default)]
pub struct StreamCollector {
    text: String,
    content_blocks: Vec<ContentBlock>,
    partial_calls: Vec<PartialCall>,
    stop_reason: Option<StopReason>,
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
    model: Option<String>,
}

#[derive(Default)]
struct PartialCall {
    id: String,
    name: String,
    args: String,
}

impl StreamCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn call_slot(&mut self, slot: u32) -> Option<&mut PartialCall> {
        let slot = usize::try_from(slot).ok()?;
        if self.partial_calls.len() <= slot {
            self.partial_calls.resize_with(slot + 1, PartialCall::default);
        }
        Some(&mut self.partial_calls[slot])
    }

    pub fn feed(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Started { model } => self.model.clone_from(model),
            StreamEvent::Text { delta } => self.text.push_str(delta),
            StreamEvent::ToolCallFragment {
                slot,
                id,
                name,
                args_fragment,
            } => {
                let Some(call) = self.call_slot(*slot) else {
                    tracing::warn!(slot, "dropping tool call fragment with unusable slot");
                    return;
                };
                if let Some(id) = id {
                    call.id.clone_from(id);
                }
                if let Some(name) = name {
                    call.name.clone_from(name);
                }
                call.args.push_str(args_fragment);
            }
            StreamEvent::ToolCall { id, name, input } => {
                self.content_blocks.push(ContentBlock::ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                });
            }
            StreamEvent::Finished {
                stop_reason,
                input_tokens,
                output_tokens,
            } => {
                self.stop_reason = *stop_reason;
                self.input_tokens = *input_tokens;
                self.output_tokens = *output_tokens;
            }
        }
    }

    pub fn finish(mut self) -> ProviderResponse {
        for call in std::mem::take(&mut self.partial_calls) {
            if call.id.is_empty() || call.name.is_empty() {
                if !call.args.trim().is_empty() {
                    tracing::warn!("dropping partial tool call missing an id or name");
                }
                continue;
            }
            match serde_json::from_str::<serde_json::Value>(&call.args) {
                Ok(input) => self.content_blocks.push(ContentBlock::ToolUse {
                    id: call.id,
                    name: call.name,
                    input,
                }),
                Err(error) => {
                    tracing::warn!(
                        tool_id = call.id,
                        tool_name = call.name,
                        "dropping tool call with malformed JSON input: {error}"
                    );
                }
            }
        }

        if !self.text.is_empty() {
            self.content_blocks.insert(
                0,
                ContentBlock::Text {
                    text: self.text.clone(),
                },
            );
        }

        ProviderResponse {
            text: self.text,
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            model: self.model,
            content_blocks: self.content_blocks,
            stop_reason: self.stop_reason,
        }
    }
}

/// Replay a non-streaming response as the event sequence a streaming call
/// would have produced. Backs the default `chat_with_tools_stream`.
pub fn resp_to_events(resp: ProviderResponse) -> Vec<Result<StreamEvent>> {
    let mut events = Vec::with_capacity(resp.content_blocks.len() + 3);
    events.push(Ok(StreamEvent::Started { model: resp.model }));
    if !resp.text.is_empty() {
        events.push(Ok(StreamEvent::Text { delta: resp.text }));
    }
    events.extend(resp.content_blocks.into_iter().filter_map(|block| match block {
        ContentBlock::ToolUse { id, name, input } => {
            Some(Ok(StreamEvent::ToolCall { id, name, input }))
        }
        ContentBlock::Text { .. } | ContentBlock::ToolResult { .. } => None,
    }));
    events.push(Ok(StreamEvent::Finished {
        stop_reason: resp.stop_reason,
        input_tokens: resp.input_tokens,
        output_tokens: resp.output_tokens,
    }));
    events
}
