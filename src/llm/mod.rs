// ── Infrastructure ───────────────────────────────────────────────────────────
pub mod streaming;
pub mod traits;
pub mod types;

// ── Provider implementations ────────────────────────────────────────────────
pub mod compatible;

// ── Re-exports ───────────────────────────────────────────────────────────────
pub use compatible::OpenAiCompatibleProvider;
pub use streaming::{
    CliStreamSink, NullStreamSink, ProviderStream, StreamCollector, StreamEvent, StreamSink,
};
pub use traits::{DisabledProvider, Provider, ProviderCapabilities, messages_to_text};
pub use types::{ContentBlock, MessageRole, ProviderMessage, ProviderResponse, StopReason};

use crate::config::LlmConfig;
use std::sync::Arc;

/// Build a provider from config: an OpenAI-compatible client when an API key
/// is present, the disabled stand-in otherwise.
pub fn create_provider(config: &LlmConfig) -> Arc<dyn Provider> {
    match config.resolve_api_key() {
        Some(key) => Arc::new(OpenAiCompatibleProvider::new(&config.base_url, Some(&key))),
        None => {
            tracing::warn!("no LLM API key configured; conversation stages run in degraded mode");
            Arc::new(DisabledProvider)
        }
    }
}
