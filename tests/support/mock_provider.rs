//! Scripted provider shared by the pipeline integration tests.
//!
//! `chat_with_system` replies serve the guardrail classifiers in call
//! order; `chat_with_tools` responses serve the agent loop. An optional
//! delay simulates a slow model for keepalive tests.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use steward::agent::ToolSpec;
use steward::llm::{ContentBlock, Provider, ProviderMessage, ProviderResponse, StopReason};

pub struct MockProvider {
    guardrail_replies: Mutex<VecDeque<String>>,
    loop_responses: Mutex<VecDeque<ProviderResponse>>,
    loop_delay: Option<Duration>,
}

impl MockProvider {
    pub fn new(guardrail: Vec<&str>, loop_responses: Vec<ProviderResponse>) -> Self {
        Self {
            guardrail_replies: Mutex::new(guardrail.into_iter().map(String::from).collect()),
            loop_responses: Mutex::new(loop_responses.into()),
            loop_delay: None,
        }
    }

    pub fn with_loop_delay(mut self, delay: Duration) -> Self {
        self.loop_delay = Some(delay);
        self
    }
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
        _tools: &'a [ToolSpec],
        _model: &'a str,
        _temperature: f64,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ProviderResponse>> + Send + 'a>> {
        Box::pin(async move {
            if let Some(delay) = self.loop_delay {
                tokio::time::sleep(delay).await;
            }
            self.loop_responses
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("loop script exhausted"))
        })
    }
}

/// A response requesting one tool call.
pub fn tool_use(id: &str, name: &str, input: serde_json::Value) -> ProviderResponse {
    ProviderResponse {
        text: String::new(),
        input_tokens: None,
        output_tokens: None,
        model: None,
        content_blocks: vec![ContentBlock::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }],
        stop_reason: Some(StopReason::ToolUse),
    }
}

pub const ALLOW_VERDICT: &str = r#"{"tripwire": false, "intent": "general_q"}"#;
pub const PASS_VERDICT: &str = r#"{"tripwire": false}"#;
