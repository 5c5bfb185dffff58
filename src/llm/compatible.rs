//! OpenAI-compatible chat-completions provider.
//!
//! Speaks the `/v1/chat/completions` dialect (tools as `function` entries,
//! SSE streaming with `data:` frames and a `[DONE]` sentinel), which covers
//! OpenAI itself plus the usual gateway products in front of it.

use super::streaming::{ProviderStream, StreamEvent};
use super::traits::{Provider, ProviderCapabilities};
use super::types::{ContentBlock, MessageRole, ProviderMessage, ProviderResponse, StopReason};
use crate::agent::ToolSpec;
use crate::error::LlmError;
use anyhow::Context;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

const PROVIDER_NAME: &str = "openai_compatible";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Clone, Serialize)]
struct WireTool {
    r#type: &'static str,
    function: WireToolDefinition,
}

#[derive(Debug, Clone, Serialize)]
struct WireToolDefinition {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    r#type: String,
    function: WireToolCallFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireToolCallFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    model: Option<String>,
    choices: Vec<ChunkChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
    tool_calls: Option<Vec<ChunkToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ChunkToolCall {
    index: u32,
    id: Option<String>,
    function: Option<ChunkToolCallFunction>,
}

#[derive(Debug, Deserialize)]
struct ChunkToolCallFunction {
    name: Option<String>,
    arguments: Option<String>,
}

// ── Request building ─────────────────────────────────────────────────────────

fn build_text_message(role: &'static str, content: String) -> Message {
    Message {
        role,
        content: Some(content),
        tool_call_id: None,
        tool_calls: None,
    }
}

fn map_provider_message(provider_message: &ProviderMessage) -> Vec<Message> {
    let mut text_parts = Vec::new();
    let mut assistant_tool_calls = Vec::new();
    let mut tool_messages = Vec::new();

    for block in &provider_message.content {
        match block {
            ContentBlock::Text { text } => {
                text_parts.push(text.clone());
            }
            ContentBlock::ToolUse { id, name, input } => {
                assistant_tool_calls.push(WireToolCall {
                    id: id.clone(),
                    r#type: "function".to_string(),
                    function: WireToolCallFunction {
                        name: name.clone(),
                        arguments: input.to_string(),
                    },
                });
            }
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error: _,
            } => {
                tool_messages.push(Message {
                    role: "tool",
                    content: Some(content.clone()),
                    tool_call_id: Some(tool_use_id.clone()),
                    tool_calls: None,
                });
            }
        }
    }

    let mut messages = Vec::new();
    let text_content = if text_parts.is_empty() {
        None
    } else {
        Some(text_parts.join("\n"))
    };

    match provider_message.role {
        MessageRole::Assistant => {
            if text_content.is_some() || !assistant_tool_calls.is_empty() {
                messages.push(Message {
                    role: "assistant",
                    content: text_content,
                    tool_call_id: None,
                    tool_calls: if assistant_tool_calls.is_empty() {
                        None
                    } else {
                        Some(assistant_tool_calls)
                    },
                });
            }
        }
        MessageRole::User => {
            if let Some(content) = text_content {
                messages.push(build_text_message("user", content));
            }
        }
        MessageRole::System => {
            if let Some(content) = text_content {
                messages.push(build_text_message("system", content));
            }
        }
    }

    messages.extend(tool_messages);
    messages
}

fn build_messages(system_prompt: Option<&str>, messages: &[ProviderMessage]) -> Vec<Message> {
    let mut wire_messages = Vec::new();

    if let Some(sys) = system_prompt {
        wire_messages.push(build_text_message("system", sys.to_string()));
    }

    for provider_message in messages {
        wire_messages.extend(map_provider_message(provider_message));
    }

    wire_messages
}

fn build_wire_tools(tools: &[ToolSpec]) -> Option<Vec<WireTool>> {
    if tools.is_empty() {
        return None;
    }
    Some(
        tools
            .iter()
            .map(|tool| WireTool {
                r#type: "function",
                function: WireToolDefinition {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: tool.parameters.clone(),
                },
            })
            .collect(),
    )
}

fn request_error(message: String) -> LlmError {
    LlmError::Request {
        provider: PROVIDER_NAME.to_string(),
        message,
    }
}

fn map_finish_reason(finish_reason: Option<&str>) -> StopReason {
    match finish_reason {
        Some("stop") => StopReason::EndTurn,
        Some("tool_calls") => StopReason::ToolUse,
        Some("length") => StopReason::MaxTokens,
        Some(_) | None => StopReason::Error,
    }
}

fn parse_tool_calls(tool_calls: Option<Vec<WireToolCall>>) -> anyhow::Result<Vec<ContentBlock>> {
    tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tool_call| {
            let input: Value =
                serde_json::from_str(&tool_call.function.arguments).with_context(|| {
                    format!(
                        "{PROVIDER_NAME} tool call arguments were not valid JSON for {}",
                        tool_call.function.name
                    )
                })?;
            Ok(ContentBlock::ToolUse {
                id: tool_call.id,
                name: tool_call.function.name,
                input,
            })
        })
        .collect()
}

fn provider_response_with_usage(text: String, usage: Option<&Usage>) -> ProviderResponse {
    if let Some(usage) = usage {
        ProviderResponse::with_usage(text, usage.prompt_tokens, usage.completion_tokens)
    } else {
        ProviderResponse::text_only(text)
    }
}

fn build_tool_provider_response(chat_response: ChatResponse) -> anyhow::Result<ProviderResponse> {
    let choice = chat_response
        .choices
        .first()
        .ok_or_else(|| anyhow::anyhow!("No response from {PROVIDER_NAME}"))?;

    let text = choice.message.content.clone().unwrap_or_default();
    let mut content_blocks = parse_tool_calls(choice.message.tool_calls.clone())?;

    if !text.is_empty() {
        content_blocks.insert(0, ContentBlock::Text { text: text.clone() });
    }

    let mut provider_response = provider_response_with_usage(text, chat_response.usage.as_ref());
    provider_response.content_blocks = content_blocks;
    provider_response.stop_reason = Some(map_finish_reason(choice.finish_reason.as_deref()));

    if let Some(api_model) = chat_response.model {
        provider_response = provider_response.with_model(api_model);
    }

    Ok(provider_response)
}

// ── SSE framing ──────────────────────────────────────────────────────────────

/// Accumulates raw response bytes and yields the `data:` payload of every
/// complete frame. Comment lines and the `[DONE]` sentinel are filtered here,
/// so the caller only ever sees candidate JSON.
struct FrameDecoder {
    pending: String,
}

impl FrameDecoder {
    fn new() -> Self {
        Self {
            pending: String::new(),
        }
    }

    fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.push_str(&String::from_utf8_lossy(bytes));

        let mut payloads = Vec::new();
        while let Some(end) = self.pending.find("\n\n") {
            let frame: String = self.pending.drain(..end + 2).collect();
            payloads.extend(
                frame
                    .lines()
                    .filter_map(|line| line.strip_prefix("data:"))
                    .map(str::trim_start)
                    .filter(|data| *data != "[DONE]")
                    .map(str::to_owned),
            );
        }
        payloads
    }
}

fn sse_response_to_provider_stream(response: reqwest::Response) -> ProviderStream {
    let mut byte_stream = response.bytes_stream();

    let stream = async_stream::try_stream! {
        let mut decoder = FrameDecoder::new();
        let mut sent_start = false;

        while let Some(chunk_result) = byte_stream.next().await {
            let bytes = chunk_result.map_err(|error| LlmError::Streaming(error.to_string()))?;

            for data in decoder.feed(&bytes) {
                let Ok(parsed) = serde_json::from_str::<ChatCompletionChunk>(&data) else {
                    continue;
                };

                if !sent_start {
                    yield StreamEvent::Started {
                        model: parsed.model.clone(),
                    };
                    sent_start = true;
                }

                for choice in &parsed.choices {
                    if let Some(content) = &choice.delta.content
                        && !content.is_empty()
                    {
                        yield StreamEvent::Text {
                            delta: content.clone(),
                        };
                    }

                    if let Some(tool_calls) = &choice.delta.tool_calls {
                        for tool_call in tool_calls {
                            yield StreamEvent::ToolCallFragment {
                                slot: tool_call.index,
                                id: tool_call.id.clone(),
                                name: tool_call.function.as_ref().and_then(|f| f.name.clone()),
                                args_fragment: tool_call
                                    .function
                                    .as_ref()
                                    .and_then(|f| f.arguments.clone())
                                    .unwrap_or_default(),
                            };
                        }
                    }

                    if let Some(finish) = choice.finish_reason.as_deref() {
                        let stop = map_finish_reason(Some(finish));
                        let (input_t, output_t) = parsed
                            .usage
                            .as_ref()
                            .map_or((None, None), |u| {
                                (Some(u.prompt_tokens), Some(u.completion_tokens))
                            });

                        yield StreamEvent::Finished {
                            stop_reason: Some(stop),
                            input_tokens: input_t,
                            output_tokens: output_t,
                        };
                    }
                }
            }
        }
    };

    Box::pin(stream)
}

// ── Provider ─────────────────────────────────────────────────────────────────

pub struct OpenAiCompatibleProvider {
    /// Pre-computed `"Bearer <key>"` header value (avoids `format!` per request).
    cached_auth_header: Option<String>,
    chat_completions_url: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(base_url: &str, api_key: Option<&str>) -> Self {
        Self {
            cached_auth_header: api_key.map(|k| format!("Bearer {k}")),
            chat_completions_url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    async fn send_raw(&self, request: &ChatRequest) -> anyhow::Result<reqwest::Response> {
        let auth_header = self.cached_auth_header.as_ref().ok_or(LlmError::Disabled)?;

        let response = self
            .client
            .post(&self.chat_completions_url)
            .header("Authorization", auth_header)
            .json(request)
            .send()
            .await
            .map_err(|error| request_error(error.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(LlmError::Auth {
                provider: PROVIDER_NAME.to_string(),
            }
            .into());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(request_error(format!("returned {status}: {body}")).into());
        }

        Ok(response)
    }

    async fn send_json(&self, request: &ChatRequest) -> anyhow::Result<ChatResponse> {
        let response = self.send_raw(request).await?;
        response
            .json()
            .await
            .map_err(|error| request_error(format!("response JSON decode failed: {error}")).into())
    }
}

impl Provider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            tool_calling: true,
            streaming: true,
        }
    }

    fn is_enabled(&self) -> bool {
        self.cached_auth_header.is_some()
    }

    fn chat_with_system<'a>(
        &'a self,
        system_prompt: Option<&'a str>,
        message: &'a str,
        model: &'a str,
        temperature: f64,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>> {
        Box::pin(async move {
            let request = ChatRequest {
                model: model.to_string(),
                messages: build_messages(system_prompt, &[ProviderMessage::user(message)]),
                temperature,
                tools: None,
                stream: None,
                stream_options: None,
            };
            let chat_response = self.send_json(&request).await?;
            chat_response
                .choices
                .first()
                .and_then(|c| c.message.content.clone())
                .ok_or_else(|| anyhow::anyhow!("No response from {PROVIDER_NAME}"))
        })
    }

    fn chat_with_tools<'a>(
        &'a self,
        system_prompt: Option<&'a str>,
        messages: &'a [ProviderMessage],
        tools: &'a [ToolSpec],
        model: &'a str,
        temperature: f64,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ProviderResponse>> + Send + 'a>> {
        Box::pin(async move {
            let request = ChatRequest {
                model: model.to_string(),
                messages: build_messages(system_prompt, messages),
                temperature,
                tools: build_wire_tools(tools),
                stream: None,
                stream_options: None,
            };
            let chat_response = self.send_json(&request).await?;
            build_tool_provider_response(chat_response)
        })
    }

    fn chat_with_tools_stream<'a>(
        &'a self,
        system_prompt: Option<&'a str>,
        messages: &'a [ProviderMessage],
        tools: &'a [ToolSpec],
        model: &'a str,
        temperature: f64,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ProviderStream>> + Send + 'a>> {
        Box::pin(async move {
            let request = ChatRequest {
                model: model.to_string(),
                messages: build_messages(system_prompt, messages),
                temperature,
                tools: build_wire_tools(tools),
                stream: Some(true),
                stream_options: Some(StreamOptions {
                    include_usage: true,
                }),
            };
            let response = self.send_raw(&request).await?;
            Ok(sse_response_to_provider_stream(response))
        })
    }
}
