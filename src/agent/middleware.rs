//! Middleware pipeline wrapped around every tool execution.

use super::context::ExecutionContext;
use super::tools::ToolResult;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

/// Longest tool output fed back to the model. Retrieval bundles can get
/// large; past this point extra evidence stops paying for its tokens.
const MAX_OUTPUT_CHARS: usize = 16_000;

pub enum MiddlewareDecision {
    Continue,
    Block(String),
}

pub trait ToolMiddleware: Send + Sync {
    fn before_execute<'a>(
        &'a self,
        _tool_name: &'a str,
        _args: &'a Value,
        _ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<MiddlewareDecision>> + Send + 'a>> {
        Box::pin(async move { Ok(MiddlewareDecision::Continue) })
    }

    fn after_execute<'a>(
        &'a self,
        _tool_name: &'a str,
        _result: &'a mut ToolResult,
        _ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {})
    }
}

// ── AuditMiddleware ──────────────────────────────────────────

/// Logs every tool invocation with its outcome.
#[derive(Debug)]
pub struct AuditMiddleware;

impl ToolMiddleware for AuditMiddleware {
    fn before_execute<'a>(
        &'a self,
        tool_name: &'a str,
        args: &'a Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<MiddlewareDecision>> + Send + 'a>> {
        Box::pin(async move {
            tracing::info!(
                tool = tool_name,
                scope = %ctx.scope.label(),
                args = %args,
                "tool call"
            );
            Ok(MiddlewareDecision::Continue)
        })
    }

    fn after_execute<'a>(
        &'a self,
        tool_name: &'a str,
        result: &'a mut ToolResult,
        _ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            if result.success {
                tracing::info!(tool = tool_name, bytes = result.output.len(), "tool ok");
            } else {
                tracing::warn!(
                    tool = tool_name,
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "tool failed"
                );
            }
        })
    }
}

// ── OutputSizeMiddleware ─────────────────────────────────────

/// Truncates oversized tool output before it re-enters the model context.
#[derive(Debug)]
pub struct OutputSizeMiddleware {
    max_chars: usize,
}

impl OutputSizeMiddleware {
    pub fn new() -> Self {
        Self {
            max_chars: MAX_OUTPUT_CHARS,
        }
    }

    #[cfg(test)]
    fn with_limit(max_chars: usize) -> Self {
        Self { max_chars }
    }
}

impl Default for OutputSizeMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolMiddleware for OutputSizeMiddleware {
    fn after_execute<'a>(
        &'a self,
        tool_name: &'a str,
        result: &'a mut ToolResult,
        _ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let len = result.output.chars().count();
            if len > self.max_chars {
                tracing::warn!(tool = tool_name, chars = len, "truncating tool output");
                let mut truncated: String =
                    result.output.chars().take(self.max_chars).collect();
                truncated.push_str("\n[output truncated]");
                result.output = truncated;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Intent, Scope};
    use crate::embedding::NoopEmbedding;
    use crate::retrieval::RetrievalGateway;
    use crate::store::InMemoryStore;
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn ctx() -> ExecutionContext {
        let gateway = RetrievalGateway::new(
            Arc::new(NoopEmbedding),
            Arc::new(InMemoryStore::new()),
        );
        ExecutionContext::new(
            Scope::global("u1"),
            Intent::GeneralQ,
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            Arc::new(gateway),
        )
    }

    #[tokio::test]
    async fn output_size_middleware_truncates() {
        let middleware = OutputSizeMiddleware::with_limit(10);
        let mut result = ToolResult::ok("x".repeat(100));
        middleware.after_execute("any", &mut result, &ctx()).await;
        assert!(result.output.starts_with("xxxxxxxxxx"));
        assert!(result.output.ends_with("[output truncated]"));
    }

    #[tokio::test]
    async fn output_size_middleware_leaves_small_output_alone() {
        let middleware = OutputSizeMiddleware::with_limit(100);
        let mut result = ToolResult::ok("short");
        middleware.after_execute("any", &mut result, &ctx()).await;
        assert_eq!(result.output, "short");
    }
}
