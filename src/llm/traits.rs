use super::streaming::{ProviderStream, resp_to_events};
use super::types::{ContentBlock, MessageRole, ProviderMessage, ProviderResponse};
use crate::agent::ToolSpec;
use crate::error::LlmError;
use futures_util::stream;
use std::future::Future;
use std::pin::Pin;

pub fn messages_to_text(messages: &[ProviderMessage]) -> String {
    messages
        .iter()
        .filter_map(|msg| {
            let role_label = match msg.role {
                MessageRole::User => "User:",
                MessageRole::Assistant => "Assistant:",
                MessageRole::System => "System:",
            };
            let text_parts: Vec<String> = msg
                .content
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.clone()),
                    ContentBlock::ToolUse { .. } | ContentBlock::ToolResult { .. } => None,
                })
                .collect();
            if text_parts.is_empty() {
                None
            } else {
                Some(format!("{} {}", role_label, text_parts.join(" ")))
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Provider capabilities reported at runtime.
#[derive(Debug, Clone, Default)]
pub struct ProviderCapabilities {
    pub tool_calling: bool,
    pub streaming: bool,
}

pub trait Provider: Send + Sync {
    /// Provider identifier (e.g. "openai_compatible", "disabled").
    fn name(&self) -> &str;

    /// Runtime capability flags.
    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::default()
    }

    /// Whether the provider has working credentials. Guardrails and the
    /// orchestrator bypass model calls entirely when this is false.
    fn is_enabled(&self) -> bool {
        true
    }

    fn chat_with_system<'a>(
        &'a self,
        system_prompt: Option<&'a str>,
        message: &'a str,
        model: &'a str,
        temperature: f64,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>>;

    fn chat_with_system_full<'a>(
        &'a self,
        system_prompt: Option<&'a str>,
        message: &'a str,
        model: &'a str,
        temperature: f64,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ProviderResponse>> + Send + 'a>> {
        Box::pin(async move {
            let text = self
                .chat_with_system(system_prompt, message, model, temperature)
                .await?;
            Ok(ProviderResponse::text_only(text))
        })
    }

    fn chat_with_tools<'a>(
        &'a self,
        system_prompt: Option<&'a str>,
        messages: &'a [ProviderMessage],
        _tools: &'a [ToolSpec],
        model: &'a str,
        temperature: f64,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ProviderResponse>> + Send + 'a>> {
        Box::pin(async move {
            let text = messages_to_text(messages);
            self.chat_with_system_full(system_prompt, &text, model, temperature)
                .await
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
            let resp = self
                .chat_with_tools(system_prompt, messages, tools, model, temperature)
                .await?;
            Ok(Box::pin(stream::iter(resp_to_events(resp))) as ProviderStream)
        })
    }

    fn supports_tool_calling(&self) -> bool {
        self.capabilities().tool_calling
    }

    fn supports_streaming(&self) -> bool {
        self.capabilities().streaming
    }
}

/// Stand-in provider used when no credentials are configured. Every stage
/// that consults it must degrade to its documented fallback instead of
/// calling through.
#[derive(Debug, Default)]
pub struct DisabledProvider;

impl Provider for DisabledProvider {
    fn name(&self) -> &str {
        "disabled"
    }

    fn is_enabled(&self) -> bool {
        false
    }

    fn chat_with_system<'a>(
        &'a self,
        _system_prompt: Option<&'a str>,
        _message: &'a str,
        _model: &'a str,
        _temperature: f64,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>> {
        Box::pin(async move { Err(LlmError::Disabled.into()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_to_text_concatenates_text_blocks() {
        let messages = vec![
            ProviderMessage::user("Hello"),
            ProviderMessage::assistant("Hi there"),
        ];
        assert_eq!(
            messages_to_text(&messages),
            "User: Hello\nAssistant: Hi there"
        );
    }

    #[test]
    fn messages_to_text_skips_tool_blocks() {
        let messages = vec![ProviderMessage {
            role: MessageRole::Assistant,
            content: vec![
                ContentBlock::Text {
                    text: "Looking that up".into(),
                },
                ContentBlock::ToolUse {
                    id: "toolu_1".into(),
                    name: "fetch_context".into(),
                    input: serde_json::json!({"query": "roadmap"}),
                },
            ],
        }];
        assert_eq!(messages_to_text(&messages), "Assistant: Looking that up");
    }

    #[test]
    fn default_capabilities_are_all_false() {
        let caps = ProviderCapabilities::default();
        assert!(!caps.tool_calling);
        assert!(!caps.streaming);
    }

    #[tokio::test]
    async fn disabled_provider_reports_disabled_and_errors() {
        let provider = DisabledProvider;
        assert!(!provider.is_enabled());
        let result = provider.chat_with_system(None, "hi", "any", 0.2).await;
        assert!(result.is_err());
    }
}
