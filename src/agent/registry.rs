//! Central registry for tool instances and the middleware pipeline.

use super::context::ExecutionContext;
use super::middleware::{MiddlewareDecision, ToolMiddleware};
use super::scope::Scope;
use super::tools::{
    AddNoteTool, CreateTaskTool, FetchContextTool, SetReminderTool, Tool, ToolResult, ToolSpec,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    middleware: Vec<Arc<dyn ToolMiddleware>>,
}

impl ToolRegistry {
    pub fn new(middleware: Vec<Arc<dyn ToolMiddleware>>) -> Self {
        Self {
            tools: HashMap::new(),
            middleware,
        }
    }

    /// The standard toolbox with audit and output-size middleware.
    pub fn standard() -> Self {
        let mut registry = Self::new(vec![
            Arc::new(super::middleware::AuditMiddleware),
            Arc::new(super::middleware::OutputSizeMiddleware::new()),
        ]);
        registry.register(Box::new(FetchContextTool));
        registry.register(Box::new(CreateTaskTool));
        registry.register(Box::new(AddNoteTool));
        registry.register(Box::new(SetReminderTool));
        registry
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let tool: Arc<dyn Tool> = Arc::from(tool);
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Return sorted list of registered tool names.
    pub fn tool_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Specs for the tools offered in `scope`, sorted by name so the model
    /// sees a stable toolbox.
    pub fn specs_for_scope(&self, scope: &Scope) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self
            .tools
            .values()
            .filter(|tool| tool.available_in(scope))
            .map(|tool| tool.spec())
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// Execute a tool through the middleware pipeline. Unknown tools and
    /// middleware blocks come back as failed results, not errors, so the
    /// model can read the reason and recover.
    pub async fn execute(
        &self,
        name: &str,
        args: Value,
        ctx: &ExecutionContext,
    ) -> anyhow::Result<ToolResult> {
        let Some(tool) = self.tools.get(name) else {
            return Ok(ToolResult::fail(format!("Tool not found: {name}")));
        };
        if !tool.available_in(&ctx.scope) {
            return Ok(ToolResult::fail(format!(
                "Tool not available in {} scope: {name}",
                ctx.scope.label()
            )));
        }

        for middleware in &self.middleware {
            match middleware.before_execute(name, &args, ctx).await? {
                MiddlewareDecision::Continue => {}
                MiddlewareDecision::Block(reason) => {
                    return Ok(ToolResult::fail(reason));
                }
            }
        }

        let mut result = tool.execute(args, ctx).await?;

        for middleware in &self.middleware {
            middleware.after_execute(name, &mut result, ctx).await;
        }

        Ok(result)
    }
}
